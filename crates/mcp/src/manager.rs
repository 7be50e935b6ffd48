//! MCP broker — holds all MCP server connections and maintains the global
//! tool registry used by the agent loop.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::oauth::OAuthChannel;
use crate::protocol::{self, McpToolDef, ToolCallResult, ToolsListResult};
use crate::transport::{HttpTransport, McpTransport, StdioTransport, TransportError};
use stepwise_domain::config::{McpConfig, McpServerConfig, McpTransportKind};

/// Spec §5: an MCP tool call must complete within 60 seconds.
const TOOL_CALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpServer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An MCP server connection (one per configured server).
///
/// The transport is opened, held, and closed by the broker that owns this
/// struct; callers only ever go through [`McpBroker`]'s forwarding methods.
pub struct McpServer {
    pub id: String,
    pub tools: Vec<McpToolDef>,
    transport: Box<dyn McpTransport>,
}

impl McpServer {
    /// Perform the MCP handshake over an already-connected transport:
    /// `initialize` -> `notifications/initialized` -> `tools/list`.
    ///
    /// A `tools/list` failure is tolerated (server registers with zero
    /// tools); failures in `initialize` itself are fatal to registration.
    async fn handshake(id: &str, transport: Box<dyn McpTransport>) -> Result<Self, McpError> {
        let init_params = protocol::initialize_params();
        let params_value = serde_json::to_value(&init_params)
            .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;

        let resp = transport
            .send_request("initialize", Some(params_value))
            .await
            .map_err(McpError::Transport)?;

        if resp.is_error() {
            let err = resp.error.unwrap();
            return Err(McpError::Protocol(format!("initialize failed: {err}")));
        }

        tracing::debug!(server_id = %id, "MCP initialize response received");

        transport
            .send_notification("notifications/initialized")
            .await
            .map_err(McpError::Transport)?;

        tracing::debug!(server_id = %id, "sent notifications/initialized");

        let tools = Self::list_tools_once(id, transport.as_ref()).await;

        tracing::info!(server_id = %id, tool_count = tools.len(), "MCP server initialized");

        Ok(Self {
            id: id.to_string(),
            tools,
            transport,
        })
    }

    async fn list_tools_once(id: &str, transport: &dyn McpTransport) -> Vec<McpToolDef> {
        let tools_resp = match transport.send_request("tools/list", None).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(server_id = %id, error = %e, "tools/list request failed, server will have no tools");
                return Vec::new();
            }
        };

        if tools_resp.is_error() {
            tracing::warn!(server_id = %id, "tools/list returned error, server will have no tools");
            return Vec::new();
        }

        let result_value = tools_resp.result.unwrap_or(Value::Null);
        match serde_json::from_value::<ToolsListResult>(result_value) {
            Ok(r) => r.tools,
            Err(e) => {
                tracing::warn!(server_id = %id, error = %e, "failed to parse tools/list result");
                Vec::new()
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::ServerDown(self.id.clone()));
        }

        let params = serde_json::json!({ "name": tool_name, "arguments": arguments });

        let resp = tokio::time::timeout(TOOL_CALL_TIMEOUT, self.transport.send_request("tools/call", Some(params)))
            .await
            .map_err(|_| McpError::Timeout(TOOL_CALL_TIMEOUT))?
            .map_err(McpError::Transport)?;

        if resp.is_error() {
            let err = resp.error.unwrap();
            return Err(McpError::Protocol(format!("tools/call failed: {err}")));
        }

        let result_value = resp.result.unwrap_or(Value::Null);
        serde_json::from_value::<ToolCallResult>(result_value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))
    }

    async fn shutdown(&self) {
        tracing::info!(server_id = %self.id, "shutting down MCP server");
        self.transport.shutdown().await;
    }
}

async fn connect(config: &McpServerConfig, oauth: &OAuthChannel) -> Result<Box<dyn McpTransport>, McpError> {
    match config.transport {
        McpTransportKind::Stdio => {
            let t = StdioTransport::spawn(config).map_err(McpError::Transport)?;
            Ok(Box::new(t))
        }
        McpTransportKind::Http => {
            let t = HttpTransport::connect(config, oauth).await.map_err(McpError::Transport)?;
            Ok(Box::new(t))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Global tool registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool name flattened across all servers, paired with the server that
/// owns it and its schema.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub server_id: String,
    pub def: McpToolDef,
}

/// Flat name -> (server, schema) registry. On a name collision the first
/// server to register the name wins; the later one is rejected and logged.
#[derive(Default)]
struct ToolRegistry {
    by_name: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    fn rebuild(&mut self, servers: &HashMap<String, McpServer>) {
        self.by_name.clear();
        // Iterate in a stable order so collisions are deterministic: the
        // server whose id sorts first keeps a contested tool name.
        let mut ids: Vec<&String> = servers.keys().collect();
        ids.sort();

        for server_id in ids {
            let server = &servers[server_id];
            if !server.is_alive() {
                continue;
            }
            for tool in &server.tools {
                if let Some(existing) = self.by_name.get(&tool.name) {
                    tracing::warn!(
                        tool = %tool.name,
                        owning_server = %existing.server_id,
                        rejected_server = %server_id,
                        "tool name collision, keeping the first-registered server"
                    );
                    continue;
                }
                self.by_name.insert(
                    tool.name.clone(),
                    RegisteredTool {
                        server_id: server_id.clone(),
                        def: tool.clone(),
                    },
                );
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpBroker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Owns all MCP server connections and the global tool registry derived
/// from them. One broker per process; the agent loop's tool calls flow
/// through [`McpBroker::call_tool`] by flat tool name.
pub struct McpBroker {
    configs: HashMap<String, McpServerConfig>,
    servers: RwLock<HashMap<String, McpServer>>,
    registry: RwLock<ToolRegistry>,
    oauth: Arc<OAuthChannel>,
}

impl McpBroker {
    /// Create a broker with no MCP servers configured.
    pub fn empty() -> Self {
        Self {
            configs: HashMap::new(),
            servers: RwLock::new(HashMap::new()),
            registry: RwLock::new(ToolRegistry::default()),
            oauth: Arc::new(OAuthChannel::new()),
        }
    }

    /// The process-global OAuth handshake channel, shared with the
    /// gateway's `/mcp/oauth/callback` route.
    pub fn oauth_channel(&self) -> Arc<OAuthChannel> {
        self.oauth.clone()
    }

    /// Initialize from config: connect each server, perform the MCP
    /// handshake, and build the flat tool registry.
    ///
    /// A server whose initial `tools/list` fails gets exactly one
    /// `Reconnect` attempt; still failing, it is dropped from the broker
    /// entirely (not fatal to the others).
    pub async fn from_config(config: &McpConfig) -> Self {
        let broker = Self::empty();

        let mut servers = HashMap::new();
        let mut configs = HashMap::new();

        for server_config in &config.servers {
            configs.insert(server_config.id.clone(), server_config.clone());

            tracing::info!(
                server_id = %server_config.id,
                transport = ?server_config.transport,
                "initializing MCP server"
            );

            match Self::init_one(server_config, &broker.oauth).await {
                Ok(server) => {
                    servers.insert(server_config.id.clone(), server);
                }
                Err(e) => {
                    tracing::warn!(
                        server_id = %server_config.id,
                        error = %e,
                        "failed to initialize MCP server after retry, dropping"
                    );
                }
            }
        }

        let mut registry = ToolRegistry::default();
        registry.rebuild(&servers);

        if !servers.is_empty() {
            tracing::info!(count = servers.len(), "MCP broker ready");
        }

        Self {
            configs,
            servers: RwLock::new(servers),
            registry: RwLock::new(registry),
            oauth: broker.oauth,
        }
    }

    async fn init_one(config: &McpServerConfig, oauth: &OAuthChannel) -> Result<McpServer, McpError> {
        let transport = connect(config, oauth).await?;
        match McpServer::handshake(&config.id, transport).await {
            Ok(server) => Ok(server),
            Err(e) => {
                tracing::warn!(
                    server_id = %config.id,
                    error = %e,
                    "initial MCP handshake failed, attempting one reconnect"
                );
                let transport = connect(config, oauth).await?;
                McpServer::handshake(&config.id, transport).await
            }
        }
    }

    /// Reconnect a single server by id (e.g. after its transport has died)
    /// and rebuild the global registry. No-op if the id is unknown.
    pub async fn reconnect(&self, server_id: &str) -> Result<(), McpError> {
        let Some(config) = self.configs.get(server_id) else {
            return Err(McpError::ServerNotFound(server_id.to_string()));
        };

        let server = Self::init_one(config, &self.oauth).await?;

        {
            let mut servers = self.servers.write().await;
            servers.insert(server_id.to_string(), server);
            let mut registry = self.registry.write().await;
            registry.rebuild(&servers);
        }

        Ok(())
    }

    /// List all tools in the flat global registry.
    pub async fn list_tools(&self) -> Vec<RegisteredTool> {
        self.registry.read().await.by_name.values().cloned().collect()
    }

    /// List all tools as domain [`ToolDescriptor`]s, the shape the agent
    /// loop snapshots into `AgentSession.tools_meta`.
    pub async fn tool_descriptors(&self) -> Vec<stepwise_domain::agent::ToolDescriptor> {
        use stepwise_domain::agent::{ToolDescriptor, TransportKind};

        self.registry
            .read()
            .await
            .by_name
            .values()
            .map(|t| {
                let transport = match self.configs.get(&t.server_id).map(|c| c.transport.clone()) {
                    Some(McpTransportKind::Http) => TransportKind::Http,
                    _ => TransportKind::Stdio,
                };
                ToolDescriptor {
                    name: t.def.name.clone(),
                    description: t.def.description.clone(),
                    input_schema: t.def.input_schema.clone(),
                    server_id: t.server_id.clone(),
                    transport,
                }
            })
            .collect()
    }

    /// Resolve a flat tool name to its owning server and call it there.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let server_id = {
            let registry = self.registry.read().await;
            registry
                .by_name
                .get(tool_name)
                .map(|t| t.server_id.clone())
                .ok_or_else(|| McpError::ToolNotFound(tool_name.to_string()))?
        };

        let servers = self.servers.read().await;
        let server = servers
            .get(&server_id)
            .ok_or_else(|| McpError::ServerNotFound(server_id.clone()))?;

        server.call_tool(tool_name, arguments).await
    }

    pub async fn server_count(&self) -> usize {
        self.servers.read().await.len()
    }

    pub async fn tool_count(&self) -> usize {
        self.registry.read().await.by_name.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.servers.read().await.is_empty()
    }

    /// Gracefully shut down all servers concurrently.
    pub async fn shutdown(&self) {
        let servers = self.servers.read().await;
        let futs: Vec<_> = servers.values().map(|s| s.shutdown()).collect();
        futures_util::future::join_all(futs).await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    #[error("MCP server is down: {0}")]
    ServerDown(String),

    #[error("MCP tool not found: {0}")]
    ToolNotFound(String),

    #[error("MCP tool call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<McpError> for stepwise_domain::error::Error {
    fn from(e: McpError) -> Self {
        match e {
            McpError::ToolNotFound(name) => stepwise_domain::error::Error::ToolNotFound(name),
            McpError::Transport(t) => stepwise_domain::error::Error::Transport {
                server_id: String::new(),
                message: t.to_string(),
            },
            McpError::Timeout(d) => stepwise_domain::error::Error::Timeout(format!("{d:?}")),
            other => stepwise_domain::error::Error::Internal(other.to_string()),
        }
    }
}
