use std::sync::Arc;

use stepwise_agent::PromptRegistry;
use stepwise_domain::config::Config;
use stepwise_llm::LlmPort;
use stepwise_mcp::McpBroker;

use crate::runtime::cancel::CancelMap;

/// Shared application state passed to all API handlers.
///
/// Far smaller than a general-purpose gateway's state: one LLM port, one
/// tool broker, an immutable prompt registry, and the bits needed for
/// per-session WebSocket cancellation and bearer-token auth.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: Arc<dyn LlmPort>,
    pub broker: Arc<McpBroker>,
    pub prompts: Arc<PromptRegistry>,
    pub cancel_map: Arc<CancelMap>,
    /// SHA-256 hash of the bearer token (read once at startup from the env
    /// var named by `config.server.token_env`). `None` = dev mode (no auth
    /// enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
