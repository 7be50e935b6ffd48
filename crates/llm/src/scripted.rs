//! A deterministic, scripted LLM port for exercising the agent loop in
//! tests without a network call.
//!
//! Holds a fixed call-index -> response table. Each call to [`call`] or
//! [`call_stream`] consumes the next scripted response; calling past the
//! end of the table is a test bug and panics loudly rather than looping.

use std::sync::atomic::{AtomicUsize, Ordering};
use stepwise_domain::capability::LlmCapabilities;
use stepwise_domain::error::{Error, Result};
use stepwise_domain::stream::{BoxStream, StreamEvent};

use crate::traits::{LlmPort, LlmRequest};

/// One scripted response: either a canned success string or a simulated
/// provider failure.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Text(String),
    Error(String),
}

/// A scripted LLM port backed by a fixed ordered list of responses.
pub struct ScriptedProvider {
    id: String,
    responses: Vec<ScriptedResponse>,
    cursor: AtomicUsize,
    capabilities: LlmCapabilities,
}

impl ScriptedProvider {
    pub fn new(id: impl Into<String>, responses: Vec<ScriptedResponse>) -> Self {
        Self {
            id: id.into(),
            responses,
            cursor: AtomicUsize::new(0),
            capabilities: LlmCapabilities::default(),
        }
    }

    fn next(&self) -> ScriptedResponse {
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(idx)
            .cloned()
            .unwrap_or_else(|| panic!("ScriptedProvider exhausted its response table at call {idx}"))
    }
}

#[async_trait::async_trait]
impl LlmPort for ScriptedProvider {
    async fn call(&self, _req: LlmRequest) -> Result<String> {
        match self.next() {
            ScriptedResponse::Text(t) => Ok(t),
            ScriptedResponse::Error(message) => Err(Error::Provider {
                provider: self.id.clone(),
                message,
            }),
        }
    }

    async fn call_stream(&self, _req: LlmRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let response = self.next();
        let events: Vec<Result<StreamEvent>> = match response {
            ScriptedResponse::Text(t) => vec![
                Ok(StreamEvent::Token { text: t.clone() }),
                Ok(StreamEvent::Done {
                    usage: None,
                    finish_reason: Some("stop".into()),
                }),
            ],
            ScriptedResponse::Error(message) => vec![Ok(StreamEvent::Error { message })],
        };
        Ok(Box::pin(futures_util::stream::iter(events)))
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_responses_in_order() {
        let provider = ScriptedProvider::new(
            "scripted",
            vec![
                ScriptedResponse::Text("first".into()),
                ScriptedResponse::Text("second".into()),
            ],
        );
        assert_eq!(provider.call(LlmRequest::default()).await.unwrap(), "first");
        assert_eq!(provider.call(LlmRequest::default()).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn surfaces_scripted_errors() {
        let provider = ScriptedProvider::new("scripted", vec![ScriptedResponse::Error("boom".into())]);
        let err = provider.call(LlmRequest::default()).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    #[should_panic(expected = "exhausted")]
    async fn panics_when_table_exhausted() {
        let provider = ScriptedProvider::new("scripted", vec![ScriptedResponse::Text("only".into())]);
        let _ = provider.call(LlmRequest::default()).await;
        let _ = provider.call(LlmRequest::default()).await;
    }
}
