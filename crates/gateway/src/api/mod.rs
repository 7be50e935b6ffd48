pub mod auth;
pub mod call;
pub mod health;
pub mod oauth_callback;
pub mod tools;
pub mod ws;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes split into **public** (no bearer check by this middleware — the
/// three `/ws/*` routes authenticate themselves via the `?token=` query
/// param instead, and `/mcp/oauth/callback` takes no credential at all)
/// and **protected** (gated behind `Authorization: Bearer <token>`).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/mcp/oauth/callback", get(oauth_callback::callback))
        .route("/ws/call", get(ws::call))
        .route("/ws/call_mcp", get(ws::call_mcp))
        .route("/ws/agent", get(ws::agent));

    let protected = Router::new()
        .route("/health", get(health::health))
        .route("/tools", get(tools::list_tools))
        .route("/call", post(call::call))
        .route("/call_mcp", post(call::call_mcp))
        .route("/agent", post(call::agent))
        .route_layer(middleware::from_fn_with_state(state, auth::require_api_token));

    public.merge(protected).layer(tower_http::trace::TraceLayer::new_for_http())
}
