//! Bearer-token authentication middleware for the MCP tool surface and
//! the automation management routes.
//!
//! If `server.bearer_token` is unset the server runs open (dev mode) —
//! a warning is logged once at startup in [`crate::bootstrap`], not here.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

pub async fn require_bearer_token(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let Some(expected) = &state.config.server.bearer_token else {
        return next.run(req).await;
    };
    let expected_hash = Sha256::digest(expected.as_bytes());

    let provided = req.headers().get("authorization").and_then(|v| v.to_str().ok()).and_then(|v| v.strip_prefix("Bearer ")).unwrap_or("");
    let provided_hash = Sha256::digest(provided.as_bytes());

    if !bool::from(provided_hash.ct_eq(&expected_hash)) {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "invalid or missing bearer token" }))).into_response();
    }

    next.run(req).await
}
