//! MCP (Model Context Protocol) server configuration types for the domain
//! layer. The actual transport/broker logic lives in the `stepwise-mcp` crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level MCP configuration: the list of servers the broker connects to
/// at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

/// Configuration for a single MCP server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique identifier for this server (used in tool naming: `{id}:{tool}`).
    pub id: String,

    /// The command to spawn for stdio transport (e.g. `"npx"`).
    #[serde(default)]
    pub command: String,

    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Transport kind (`"stdio"` or `"http"`).
    #[serde(default)]
    pub transport: McpTransportKind,

    /// URL for http transport.
    #[serde(default)]
    pub url: Option<String>,

    /// Environment variables to set on the spawned process (stdio only).
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Authentication for http transport. Ignored for stdio.
    #[serde(default)]
    pub auth: McpAuthConfig,
}

/// Transport kind for connecting to an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Http,
}

/// Authentication configuration for an http-transport MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpAuthConfig {
    #[serde(default)]
    pub mode: McpAuthMode,
    /// Env var holding a static bearer/api-key token (`bearer`/`api_key` modes).
    #[serde(default)]
    pub token_env: Option<String>,
    /// OAuth client id (`oauth`/`oauth_browser`/`client_credentials` modes).
    #[serde(default)]
    pub client_id: Option<String>,
    /// OAuth client secret env var (`client_credentials` mode).
    #[serde(default)]
    pub client_secret_env: Option<String>,
    /// OAuth authorization endpoint (`oauth`/`oauth_browser` modes).
    #[serde(default)]
    pub authorize_url: Option<String>,
    /// OAuth token endpoint (all oauth-family modes).
    #[serde(default)]
    pub token_url: Option<String>,
    /// Redirect URI the local callback server listens on (`oauth`/`oauth_browser`).
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// Authentication mode for an http-transport MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum McpAuthMode {
    #[default]
    None,
    Bearer,
    ApiKey,
    Oauth,
    OauthBrowser,
    /// Non-interactive OAuth2 client-credentials grant (see DESIGN.md).
    ClientCredentials,
}
