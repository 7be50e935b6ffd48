//! `AppState` construction, shared by `serve` and `doctor`.

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use stepwise_domain::config::{Config, ConfigSeverity, LlmConfig, ProviderKind};
use stepwise_llm::{LlmPort, OpenAiCompatProvider};
use stepwise_mcp::McpBroker;

use crate::runtime::cancel::CancelMap;
use crate::state::AppState;

/// Validate config, initialize every subsystem, and return a fully-wired
/// [`AppState`]. Config errors are fatal — the caller should exit before
/// binding any listener.
pub async fn build_app_state(config: Config) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let error_count = issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count();
    if error_count > 0 {
        anyhow::bail!("config validation failed with {error_count} error(s); refusing to start");
    }

    let broker = Arc::new(McpBroker::from_config(&config.mcp).await);
    tracing::info!(
        servers = broker.server_count().await,
        tools = broker.tool_count().await,
        "MCP broker ready"
    );

    let llm: Arc<dyn LlmPort> = Arc::new(select_llm_provider(&config.llm)?);
    tracing::info!(provider = llm.provider_id(), "LLM provider ready");

    let prompts = Arc::new(stepwise_agent::builtin_registry());
    let cancel_map = Arc::new(CancelMap::new());
    let api_token_hash = resolve_api_token_hash(&config);

    Ok(AppState {
        config: Arc::new(config),
        llm,
        broker,
        prompts,
        cancel_map,
        api_token_hash,
    })
}

/// Map the `LLM_PROVIDER` env var to the [`ProviderKind`] it selects.
pub fn provider_kind_for(value: &str) -> anyhow::Result<ProviderKind> {
    match value {
        "OPENAI" => Ok(ProviderKind::OpenaiCompat),
        "AZURE_OPENAI" => Ok(ProviderKind::AzureOpenai),
        other => anyhow::bail!("unknown LLM_PROVIDER '{other}' (expected OPENAI or AZURE_OPENAI)"),
    }
}

/// Pick the one active LLM provider named by `LLM_PROVIDER` out of the
/// configured provider list and build its port.
fn select_llm_provider(config: &LlmConfig) -> anyhow::Result<OpenAiCompatProvider> {
    let wanted = std::env::var("LLM_PROVIDER").context("LLM_PROVIDER env var is required")?;
    let kind = provider_kind_for(&wanted)?;

    let provider_cfg = config
        .providers
        .iter()
        .find(|p| p.kind == kind)
        .ok_or_else(|| anyhow::anyhow!("no llm.providers entry configured for LLM_PROVIDER={wanted}"))?;

    OpenAiCompatProvider::from_config(provider_cfg).context("initializing LLM provider")
}

/// Hash the bearer token named by `config.server.token_env` once at
/// startup. `None` means dev mode (no auth enforced).
fn resolve_api_token_hash(config: &Config) -> Option<Vec<u8>> {
    let raw = std::env::var(&config.server.token_env).ok().filter(|v| !v.is_empty());
    match raw {
        Some(token) => Some(Sha256::digest(token.as_bytes()).to_vec()),
        None => {
            if config.server.require_auth {
                // Already surfaced as a fatal ConfigError by `Config::validate`.
            } else {
                tracing::warn!(
                    env = %config.server.token_env,
                    "no bearer token configured; running in dev mode (auth not enforced)"
                );
            }
            None
        }
    }
}
