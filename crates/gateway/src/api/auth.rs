//! Bearer-token authentication shared by the HTTP and WebSocket routes.
//!
//! `AppState.api_token_hash` is computed once at startup (see
//! `bootstrap::build_app_state`) from the env var named by
//! `config.server.token_env`. `None` means dev mode: no auth enforced.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Axum middleware enforcing `Authorization: Bearer <token>` on protected
/// HTTP routes. Attach via `axum::middleware::from_fn_with_state`.
pub async fn require_api_token(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let expected_hash = match &state.api_token_hash {
        Some(h) => h,
        None => return next.run(req).await,
    };

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if !token_matches(provided, expected_hash) {
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({ "error": "invalid or missing API token" })),
        )
            .into_response();
    }

    next.run(req).await
}

/// Check a WebSocket's `?token=` query param against the cached hash.
/// Returns `true` when auth is satisfied (including dev mode, where any
/// token — including none — is accepted).
pub fn check_ws_token(state: &AppState, provided: Option<&str>) -> bool {
    let expected_hash = match &state.api_token_hash {
        Some(h) => h,
        None => return true,
    };
    token_matches(provided.unwrap_or(""), expected_hash)
}

/// Hash `provided` and compare against `expected_hash` in constant time.
/// Hashing first normalizes lengths so the comparison never leaks the
/// provided token's length.
fn token_matches(provided: &str, expected_hash: &[u8]) -> bool {
    let provided_hash = Sha256::digest(provided.as_bytes());
    bool::from(provided_hash.ct_eq(expected_hash))
}
