//! The three WebSocket routes: `/ws/call`, `/ws/call_mcp`, `/ws/agent`.
//!
//! All three share the same shape: upgrade, authenticate via the
//! `?token=` query param (close code 1008 on failure), read the first
//! text frame as the prompt, then stream frames back and close.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde::Deserialize;

use stepwise_agent::service;
use stepwise_domain::agent::{AgentEvent, AgentSession};
use stepwise_domain::stream::StreamEvent;
use stepwise_llm::LlmRequest;

use super::auth::check_ws_token;
use crate::state::AppState;

const UNAUTHORIZED_CLOSE: u16 = 1008;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /ws/call` — token stream from a bare LLM call.
pub async fn call(ws: WebSocketUpgrade, State(state): State<AppState>, Query(q): Query<WsQuery>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_call(socket, state, q.token))
}

/// `GET /ws/call_mcp` — one tool-broker step, then `{result, trace}` and close.
pub async fn call_mcp(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_call_mcp(socket, state, q.token))
}

/// `GET /ws/agent` — the full agent loop, streaming domain events, then a
/// terminal `{event:"final",...}` frame.
pub async fn agent(ws: WebSocketUpgrade, State(state): State<AppState>, Query(q): Query<WsQuery>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_agent(socket, state, q.token))
}

// ── shared helpers ──────────────────────────────────────────────────

async fn authenticate(socket: &mut WebSocket, state: &AppState, token: Option<&str>) -> bool {
    if check_ws_token(state, token) {
        return true;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: UNAUTHORIZED_CLOSE,
            reason: "invalid or missing token".into(),
        })))
        .await;
    false
}

/// Wait for the first text frame and treat it as the prompt. Any other
/// frame (or a disconnect) before that ends the connection.
async fn read_prompt(socket: &mut WebSocket) -> Option<String> {
    while let Some(Ok(msg)) = socket.next().await {
        match msg {
            Message::Text(text) => return Some(text),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

// ── /ws/call ─────────────────────────────────────────────────────────

async fn handle_call(mut socket: WebSocket, state: AppState, token: Option<String>) {
    if !authenticate(&mut socket, &state, token.as_deref()).await {
        return;
    }
    let Some(prompt) = read_prompt(&mut socket).await else {
        return;
    };

    let mut stream = match state.llm.call_stream(LlmRequest { prompt, ..Default::default() }).await {
        Ok(s) => s,
        Err(e) => {
            let _ = send_json(&mut socket, &serde_json::json!({ "event": "error", "error": e.to_string() })).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let mut full_text = String::new();
    while let Some(event) = stream.next().await {
        match event {
            Ok(StreamEvent::Token { text }) => {
                full_text.push_str(&text);
                if send_json(&mut socket, &serde_json::json!({ "token": text })).await.is_err() {
                    return;
                }
            }
            Ok(StreamEvent::Done { .. }) => break,
            Ok(StreamEvent::Error { message }) => {
                let _ = send_json(&mut socket, &serde_json::json!({ "event": "error", "error": message })).await;
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = send_json(&mut socket, &serde_json::json!({ "event": "error", "error": e.to_string() })).await;
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        }
    }

    let _ = send_json(&mut socket, &serde_json::json!({ "complete": true, "result": full_text })).await;
    let _ = socket.send(Message::Close(None)).await;
}

// ── /ws/call_mcp ─────────────────────────────────────────────────────

async fn handle_call_mcp(mut socket: WebSocket, state: AppState, token: Option<String>) {
    if !authenticate(&mut socket, &state, token.as_deref()).await {
        return;
    }
    let Some(prompt) = read_prompt(&mut socket).await else {
        return;
    };

    let mut session = AgentSession::new(prompt, 1);
    let outcome = service::run(&mut session, state.llm.as_ref(), &state.broker, &state.prompts, None).await;

    let _ = send_json(
        &mut socket,
        &serde_json::json!({ "result": outcome.final_observation, "trace": outcome.trace }),
    )
    .await;
    let _ = socket.send(Message::Close(None)).await;
}

// ── /ws/agent ────────────────────────────────────────────────────────

/// Run the agent loop and the WebSocket's read side concurrently: whoever
/// finishes first cancels the other via a shared `CancelToken`. The
/// reader's only job once streaming starts is to notice a client
/// disconnect; the agent task polls the token between steps is not
/// wired into `stepwise_agent::service` today, so cancellation here acts
/// at the event-pump boundary — once the client disconnects the pump
/// stops forwarding and the agent task is dropped when this future ends.
async fn handle_agent(mut socket: WebSocket, state: AppState, token: Option<String>) {
    if !authenticate(&mut socket, &state, token.as_deref()).await {
        return;
    }
    let Some(prompt) = read_prompt(&mut socket).await else {
        return;
    };

    let session_key = uuid::Uuid::new_v4().to_string();
    let cancel = state.cancel_map.register(&session_key);

    let (publisher, mut subscriber) = stepwise_agent::channel();
    let mut session = AgentSession::new(prompt, 10);

    let llm = state.llm.clone();
    let broker = state.broker.clone();
    let prompts = state.prompts.clone();

    let agent_handle = tokio::spawn(async move {
        service::run(&mut session, llm.as_ref(), &broker, &prompts, Some(&publisher)).await
    });
    tokio::pin!(agent_handle);

    loop {
        tokio::select! {
            biased;

            // Client disconnected (or sent something) before the agent
            // finished: cancel it and stop forwarding.
            msg = socket.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        cancel.cancel();
                        break;
                    }
                    _ => continue,
                }
            }

            event = subscriber.recv() => {
                let Some(event) = event else { continue };
                if send_json(&mut socket, &event_frame(&event)).await.is_err() {
                    cancel.cancel();
                    break;
                }
            }

            outcome = &mut agent_handle => {
                let outcome = outcome.unwrap_or_else(|_| stepwise_agent::AgentOutcome {
                    final_observation: "Agent error: task panicked".into(),
                    trace: Vec::new(),
                });
                // Drain any events still queued before the final frame; the
                // publisher side is dropped with the finished task, so
                // `recv` returns `None` as soon as the channel empties.
                while let Some(event) = subscriber.recv().now_or_never().flatten() {
                    let _ = send_json(&mut socket, &event_frame(&event)).await;
                }
                let _ = send_json(
                    &mut socket,
                    &serde_json::json!({ "event": "final", "result": outcome.final_observation, "trace": outcome.trace }),
                )
                .await;
                break;
            }
        }
    }

    state.cancel_map.remove(&session_key);
    let _ = socket.send(Message::Close(None)).await;
}

fn event_frame(event: &AgentEvent) -> serde_json::Value {
    serde_json::json!({ "event": event.event_type, "data": event.data })
}

async fn send_json(socket: &mut WebSocket, value: &serde_json::Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(value.to_string())).await
}
