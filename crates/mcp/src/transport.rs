//! MCP transport layer.
//!
//! Each MCP server communicates over a transport:
//! - **Stdio**: spawn a child process, send JSON-RPC over stdin/stdout.
//! - **Http**: POST JSON-RPC requests to a streaming HTTP endpoint.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use crate::oauth::OAuthChannel;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use stepwise_domain::config::{McpAuthMode, McpServerConfig};

/// Trait for MCP server transports.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and wait for the corresponding response.
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError>;

    /// Send a JSON-RPC notification (no response expected).
    async fn send_notification(&self, method: &str) -> Result<(), TransportError>;

    /// Check if the transport is still alive.
    fn is_alive(&self) -> bool;

    /// Shut down the transport gracefully. Idempotent.
    async fn shutdown(&self);
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MCP server process has exited")]
    ProcessExited,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("OAuth handshake failed: {0}")]
    Auth(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stdio transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maximum number of non-JSON lines to skip before declaring the server broken.
const MAX_SKIP_LINES: usize = 1000;

/// Stdio transport: communicates with a child process over stdin/stdout.
///
/// Each JSON-RPC message is a single newline-delimited line.
/// The `request_lock` serializes entire request/response cycles to prevent
/// response mismatching when multiple callers use the same server.
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    request_lock: Mutex<()>,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl StdioTransport {
    /// Spawn a child process from the given server config.
    ///
    /// Retry policy lives in the broker (`Init`): one retry with a 30s
    /// handshake timeout, then give up.
    pub fn spawn(config: &McpServerConfig) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(TransportError::Io)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdin",
            ))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdout",
            ))
        })?;

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            request_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        })
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read a line of JSON from stdout, skipping any empty or non-JSON lines.
    ///
    /// Gives up after [`MAX_SKIP_LINES`] non-JSON lines to prevent spinning
    /// on a misconfigured server that writes logging to stdout.
    async fn read_line(&self) -> Result<String, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }

        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            let bytes_read = stdout.read_line(&mut line).await?;
            if bytes_read == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::ProcessExited);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "MCP server produced too many non-JSON lines on stdout",
                )));
            }
            tracing::debug!(line = %trimmed, "skipping non-JSON line from MCP server stdout");
        }
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        let _guard = self.request_lock.lock().await;

        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)?;

        tracing::debug!(id, method, "sending MCP request");
        self.write_line(&json).await?;

        let timeout = Duration::from_secs(30);
        let result = tokio::time::timeout(timeout, async {
            loop {
                let line = self.read_line().await?;
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&line) {
                    if resp.id == id {
                        return Ok(resp);
                    }
                    tracing::debug!(expected_id = id, got_id = resp.id, "response for different request, continuing");
                }
                tracing::debug!(line = %line, "skipping non-matching message from MCP server");
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        let json = serde_json::to_string(&notif)?;
        tracing::debug!(method, "sending MCP notification");
        self.write_line(&json).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(error = %e, "error closing MCP server stdin");
            }
        }
        let timeout = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
        match timeout {
            Ok(Ok(status)) => tracing::debug!(?status, "MCP server process exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "error waiting for MCP server process"),
            Err(_) => {
                tracing::warn!("MCP server process did not exit within timeout, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill MCP server process");
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// HTTP transport: POSTs JSON-RPC requests to a streaming HTTP endpoint.
///
/// Auth policy (spec 4.3): `oauth`/`oauth_browser` get no connect timeout
/// (the flow may be interactive, serialized through [`OAuthChannel`]);
/// `bearer`/`api_key`/`client_credentials` attach a bearer token and a
/// short (~30s) connect timeout; otherwise connect without auth.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    bearer: Option<String>,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl HttpTransport {
    pub async fn connect(
        config: &McpServerConfig,
        oauth: &OAuthChannel,
    ) -> Result<Self, TransportError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| TransportError::Http("missing url for http transport".into()))?;

        let (bearer, connect_timeout) = match config.auth.mode {
            McpAuthMode::None => (None, Duration::from_secs(30)),
            McpAuthMode::Bearer | McpAuthMode::ApiKey => {
                let token = resolve_env(config.auth.token_env.as_deref())
                    .ok_or_else(|| TransportError::Auth("token_env not set".into()))?;
                (Some(token), Duration::from_secs(30))
            }
            McpAuthMode::Oauth | McpAuthMode::OauthBrowser => {
                let code = oauth
                    .wait_for_code()
                    .await
                    .ok_or_else(|| TransportError::Auth("OAuth channel closed before a code arrived".into()))?;
                let token = exchange_code_for_token(config, &code.code)
                    .await
                    .map_err(|e| TransportError::Auth(e.to_string()))?;
                // interactive flows get no connect timeout
                (Some(token), Duration::from_secs(3600))
            }
            McpAuthMode::ClientCredentials => {
                let token = fetch_client_credentials_token(config)
                    .await
                    .map_err(|e| TransportError::Auth(e.to_string()))?;
                (Some(token), Duration::from_secs(30))
            }
        };

        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url,
            bearer,
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        })
    }
}

/// Exchange an authorization code for an access token. Shares the
/// `client_credentials` config fields for the token endpoint/client id.
async fn exchange_code_for_token(config: &McpServerConfig, code: &str) -> Result<String, reqwest::Error> {
    let token_url = config.auth.token_url.clone().unwrap_or_default();
    let client = reqwest::Client::new();
    let resp: TokenResponse = client
        .post(&token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", config.auth.client_id.as_deref().unwrap_or_default()),
            (
                "redirect_uri",
                config.auth.redirect_uri.as_deref().unwrap_or_default(),
            ),
        ])
        .send()
        .await?
        .json()
        .await?;
    Ok(resp.access_token)
}

/// Non-interactive OAuth2 client-credentials grant, grounded in the
/// original implementation's `TokenManager._fetch_client_credentials`.
async fn fetch_client_credentials_token(config: &McpServerConfig) -> Result<String, reqwest::Error> {
    let token_url = config.auth.token_url.clone().unwrap_or_default();
    let client_secret = resolve_env(config.auth.client_secret_env.as_deref()).unwrap_or_default();
    let client = reqwest::Client::new();
    let resp: TokenResponse = client
        .post(&token_url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", config.auth.client_id.as_deref().unwrap_or_default()),
            ("client_secret", client_secret.as_str()),
        ])
        .send()
        .await?
        .json()
        .await?;
    Ok(resp.access_token)
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn resolve_env(name: Option<&str>) -> Option<String> {
    name.and_then(|n| std::env::var(n).ok())
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::Http("transport is shut down".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);

        let mut builder = self.client.post(&self.url).json(&req);
        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(TransportError::Http(format!("HTTP {}", resp.status())));
        }
        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        let mut builder = self.client.post(&self.url).json(&notif);
        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }
        builder.send().await.map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}
