//! Shared JSON error envelope for handlers that don't otherwise produce
//! a [`cw_domain::tool::ToolResponse`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub fn api_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": { "message": message } }))).into_response()
}
