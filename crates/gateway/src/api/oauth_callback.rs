//! `GET /mcp/oauth/callback` — the redirect target for an MCP server's
//! OAuth authorization flow. No bearer auth: the provider redirects the
//! user's browser here directly, carrying the one-time code.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OauthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

pub async fn callback(State(state): State<AppState>, Query(q): Query<OauthCallbackQuery>) -> Response {
    let Some(code) = q.code else {
        return (StatusCode::BAD_REQUEST, "missing code").into_response();
    };

    state.broker.oauth_channel().deliver(code, q.state.unwrap_or_default()).await;

    (StatusCode::OK, "Auth received, you may close this window.").into_response()
}
