pub mod auth;
pub mod automation;
pub mod channel;
pub mod error;
pub mod health;
pub mod mcp;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (the health probe and the channel
/// handshake endpoints, which authenticate themselves) and **protected**
/// (gated behind the bearer-token middleware).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/feishu/webhook", post(channel::webhook))
        .route("/feishu/events", post(channel::events))
        .route("/events", post(automation::events))
        .route("/automation/webhook/:rule_id", post(automation::trigger_webhook));

    let protected = Router::new()
        .route("/mcp/tools", get(mcp::list_tools))
        .route("/mcp/tools/:tool_name", post(mcp::invoke_tool))
        .route("/mcp/metrics", get(mcp::metrics))
        .route("/automation/init", post(automation::init))
        .route("/automation/scan", post(automation::scan))
        .route("/automation/sync", post(automation::sync))
        .route("/automation/schema/refresh", post(automation::schema_refresh))
        .route("/automation/delay/tasks", get(automation::list_delay_tasks))
        .route("/automation/delay/:id/cancel", post(automation::cancel_delay_task))
        .route("/automation/auth/health", get(automation::auth_health))
        .route("/automation/metrics", get(automation::metrics))
        .route_layer(middleware::from_fn_with_state(state, auth::require_bearer_token));

    public.merge(protected).layer(tower_http::trace::TraceLayer::new_for_http())
}
