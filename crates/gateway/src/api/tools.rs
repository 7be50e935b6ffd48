use axum::extract::State;
use axum::Json;
use stepwise_domain::agent::ToolDescriptor;

use crate::state::AppState;

/// `GET /tools` — the broker's flat tool registry, stateless (no session
/// is created for this route).
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDescriptor>> {
    Json(state.broker.tool_descriptors().await)
}
