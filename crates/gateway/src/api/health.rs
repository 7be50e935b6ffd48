use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    mcp_ready: bool,
}

/// `GET /health` — liveness probe. `mcp_ready` reflects whether at least
/// one configured MCP server is currently connected; an empty server list
/// counts as ready since there's nothing to wait on.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let configured = state.config.mcp.servers.len();
    let mcp_ready = configured == 0 || state.broker.server_count().await > 0;

    Json(HealthResponse {
        status: "ok",
        mcp_ready,
    })
}
