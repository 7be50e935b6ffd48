//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Azure OpenAI, Ollama, vLLM, LM Studio, Together,
//! and any other endpoint that follows the OpenAI chat completions contract.
//! This is the one reference adapter the port ships; everything else is a
//! scripted stand-in for tests.

use crate::auth::AuthRotator;
use crate::traits::{LlmPort, LlmRequest};
use crate::util::from_reqwest;
use serde_json::Value;
use std::sync::Arc;
use stepwise_domain::capability::{LlmCapabilities, ToolSupport};
use stepwise_domain::config::{ProviderConfig, ProviderKind};
use stepwise_domain::error::{Error, Result};
use stepwise_domain::stream::{BoxStream, StreamEvent, Usage};

/// An LLM provider adapter for any OpenAI-compatible API endpoint.
///
/// Also handles Azure OpenAI, which uses the same wire format but with a
/// different URL pattern (`/openai/deployments/{model}/chat/completions`)
/// and auth header (`api-key` instead of `Authorization: Bearer`).
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    auth: Arc<AuthRotator>,
    default_model: String,
    capabilities: LlmCapabilities,
    client: reqwest::Client,
    is_azure: bool,
}

impl OpenAiCompatProvider {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let is_azure = cfg.kind == ProviderKind::AzureOpenai;
        let auth = Arc::new(AuthRotator::from_auth_config(&cfg.auth)?);
        let default_model = cfg.default_model.clone().unwrap_or_else(|| "gpt-4o".into());

        let capabilities = LlmCapabilities {
            supports_tools: ToolSupport::None,
            supports_streaming: true,
            supports_json_mode: true,
            supports_vision: false,
            context_window_tokens: Some(128_000),
            max_output_tokens: Some(16_384),
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            auth,
            default_model,
            capabilities,
            client,
            is_azure,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let entry = self.auth.next_key();
        if self.is_azure {
            self.client.post(url).header("api-key", entry.key)
        } else {
            self.client.post(url).bearer_auth(entry.key)
        }
    }

    fn effective_model(&self, req: &LlmRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn azure_chat_url(&self, model: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version=2024-10-21",
            self.base_url, model
        )
    }

    fn chat_url(&self, req: &LlmRequest) -> String {
        if self.is_azure {
            self.azure_chat_url(&self.effective_model(req))
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    fn build_body(&self, req: &LlmRequest, stream: bool) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &req.system_prompt {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": req.prompt }));

        let mut body = serde_json::json!({
            "messages": messages,
            "stream": stream,
        });

        if !self.is_azure {
            body["model"] = Value::String(self.effective_model(req));
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(top_p) = req.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }
}

fn parse_chat_content(body: &Value, provider: &str) -> Result<String> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: provider.into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: provider.into(),
        message: "no message in choice".into(),
    })?;

    Ok(message.get("content").and_then(|v| v.as_str()).unwrap_or("").to_string())
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

/// Parse a single SSE `data:` payload into zero or more stream events.
fn parse_sse_data(data: &str) -> Vec<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        })];
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let choice = v.get("choices").and_then(|c| c.as_array()).and_then(|a| a.first());

    let choice = match choice {
        Some(c) => c,
        None => {
            if let Some(usage) = v.get("usage").and_then(parse_openai_usage) {
                return vec![Ok(StreamEvent::Done {
                    usage: Some(usage),
                    finish_reason: None,
                })];
            }
            return Vec::new();
        }
    };

    let delta = choice.get("delta").unwrap_or(&Value::Null);

    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        let usage = v.get("usage").and_then(parse_openai_usage);
        return vec![Ok(StreamEvent::Done {
            usage,
            finish_reason: Some(fr.to_string()),
        })];
    }

    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            return vec![Ok(StreamEvent::Token { text: text.to_string() })];
        }
    }

    Vec::new()
}

#[async_trait::async_trait]
impl LlmPort for OpenAiCompatProvider {
    async fn call(&self, req: LlmRequest) -> Result<String> {
        let url = self.chat_url(&req);
        let body = self.build_body(&req, false);

        tracing::debug!(provider = %self.id, url = %url, "openai_compat call");

        let resp = self.authed_post(&url).json(&body).send().await.map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), resp_text),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_chat_content(&resp_json, &self.id)
    }

    async fn call_stream(&self, req: LlmRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = self.chat_url(&req);
        let body = self.build_body(&req, true);
        let provider_id = self.id.clone();

        tracing::debug!(provider = %self.id, url = %url, "openai_compat call_stream");

        let resp = self.authed_post(&url).json(&body).send().await.map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: provider_id,
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }

        Ok(crate::sse::sse_response_stream(resp, parse_sse_data))
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

    #[test]
    fn parse_chat_content_extracts_text() {
        let body = serde_json::json!({
            "choices": [{ "message": { "content": "hello there" } }]
        });
        assert_eq!(parse_chat_content(&body, "test").unwrap(), "hello there");
    }

    #[test]
    fn parse_chat_content_no_choices_is_error() {
        let body = serde_json::json!({ "choices": [] });
        assert!(parse_chat_content(&body, "test").is_err());
    }

    #[test]
    fn parse_sse_data_done_sentinel() {
        let events = parse_sse_data("[DONE]");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(StreamEvent::Done { .. })));
    }

    #[test]
    fn parse_sse_data_token_delta() {
        let raw = r#"{"choices":[{"delta":{"content":"hi"}}]}"#;
        let events = parse_sse_data(raw);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Ok(StreamEvent::Token { text }) => assert_eq!(text, "hi"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_sse_data_finish_reason() {
        let raw = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let events = parse_sse_data(raw);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Ok(StreamEvent::Done { finish_reason: Some(r), .. }) if r == "stop"
        ));
    }
}
