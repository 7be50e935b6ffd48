//! `POST /call`, `POST /call_mcp`, `POST /agent` — the three one-shot HTTP
//! entry points into the LLM / tool broker / agent loop.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};

use stepwise_agent::service;
use stepwise_domain::agent::{AgentSession, TraceEntry};
use stepwise_llm::LlmRequest;

use crate::state::AppState;

/// Default step budget for `/agent` when the caller doesn't override it.
const DEFAULT_MAX_STEPS: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct CallRequest {
    pub prompt: String,
    #[serde(default)]
    pub max_steps: Option<u32>,
}

#[derive(Serialize)]
pub struct CallResponse {
    pub result: String,
    pub trace: Option<Vec<TraceEntry>>,
    pub plan: Option<serde_json::Value>,
}

/// `POST /call` — a bare LLM call, bypassing the tool broker and agent
/// loop entirely.
pub async fn call(State(state): State<AppState>, Json(body): Json<CallRequest>) -> impl IntoResponse {
    match state.llm.call(LlmRequest { prompt: body.prompt, ..Default::default() }).await {
        Ok(result) => Json(CallResponse { result, trace: None, plan: None }).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// `POST /call_mcp` — a single plan/act/summarise step against the tool
/// broker (an agent run capped at one step). 503 if the broker has
/// configured servers but none are connected yet.
pub async fn call_mcp(State(state): State<AppState>, Json(body): Json<CallRequest>) -> impl IntoResponse {
    if broker_not_ready(&state).await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "MCP broker not ready" })),
        )
            .into_response();
    }

    let mut session = AgentSession::new(body.prompt, 1);
    let outcome = service::run(&mut session, state.llm.as_ref(), &state.broker, &state.prompts, None).await;

    Json(CallResponse {
        result: outcome.final_observation,
        trace: Some(outcome.trace),
        plan: None,
    })
    .into_response()
}

/// `POST /agent` — the full multi-step agent loop.
pub async fn agent(State(state): State<AppState>, Json(body): Json<CallRequest>) -> impl IntoResponse {
    if broker_not_ready(&state).await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "MCP broker not ready" })),
        )
            .into_response();
    }

    let max_steps = body.max_steps.unwrap_or(DEFAULT_MAX_STEPS);
    let mut session = AgentSession::new(body.prompt, max_steps);

    let run = service::run(&mut session, state.llm.as_ref(), &state.broker, &state.prompts, None);
    let timeout = std::time::Duration::from_secs(180);

    match tokio::time::timeout(timeout, run).await {
        Ok(outcome) => Json(CallResponse {
            result: outcome.final_observation,
            trace: Some(outcome.trace),
            plan: None,
        })
        .into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "Operation timed out" })),
        )
            .into_response(),
    }
}

async fn broker_not_ready(state: &AppState) -> bool {
    !state.config.mcp.servers.is_empty() && state.broker.server_count().await == 0
}
