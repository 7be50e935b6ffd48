//! `stepwise-mcp` — Model Context Protocol client and broker.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with MCP servers.
//! - Stdio and HTTP transports (the latter with bearer/api-key/oauth/
//!   client-credentials auth).
//! - An [`McpBroker`] that manages connections to multiple MCP servers and
//!   maintains the flat tool-name registry the agent loop dispatches
//!   through.
//!
//! # Usage
//!
//! ```rust,ignore
//! use stepwise_mcp::{McpConfig, McpBroker};
//!
//! let config: McpConfig = /* from TOML */;
//! let broker = McpBroker::from_config(&config).await;
//!
//! for tool in broker.list_tools().await {
//!     println!("{} -> {}", tool.def.name, tool.server_id);
//! }
//!
//! let result = broker.call_tool("read_file", json!({"path": "/tmp/test.txt"})).await?;
//! ```

pub mod config;
pub mod manager;
pub mod oauth;
pub mod protocol;
pub mod transport;

pub use config::{McpConfig, McpServerConfig, McpTransportKind};
pub use manager::{McpBroker, McpError, RegisteredTool};
pub use oauth::{AuthCode, OAuthChannel};
pub use protocol::McpToolDef;
