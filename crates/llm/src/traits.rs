use stepwise_domain::capability::LlmCapabilities;
use stepwise_domain::error::Result;
use stepwise_domain::stream::{BoxStream, StreamEvent};

/// A request to the LLM port.
///
/// Mirrors the port's `Call`/`CallStream` signature: a single prompt plus an
/// optional system prompt, not a full chat message history — message-history
/// assembly is the planner's job, not the port's.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub json_mode: bool,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
}

/// The LLM port: the contract by which the agent asks a language model to
/// produce text. Implementations are adapters that translate this call
/// into a specific provider's wire format.
#[async_trait::async_trait]
pub trait LlmPort: Send + Sync {
    /// Blocking call: returns the full model output.
    async fn call(&self, req: LlmRequest) -> Result<String>;

    /// Returns a finite, single-pass sequence of text chunks terminated by
    /// a `Done` event (or an `Error` event on failure).
    async fn call_stream(&self, req: LlmRequest) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// The advertised capabilities of this provider/model combination.
    fn capabilities(&self) -> &LlmCapabilities;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
