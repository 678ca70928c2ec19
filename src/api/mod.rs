pub mod admin;
pub mod gateway;
pub mod health;

use axum::Router;
use axum::routing::{get, post};

use crate::AppState;

/// Build the full API router with all endpoint groups.
///
/// Route layout:
/// ```text
/// /                   GET
/// /health             GET
/// /openai             POST
/// /google             POST
/// /anthropic          POST
/// /v1/chat            POST   (provider taken from the body)
/// /pricing            GET
/// /users              POST
/// /users/{id}/ledger  GET
/// ```
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health::banner))
        .route("/health", get(health::health_check))
        .route("/openai", post(gateway::openai))
        .route("/google", post(gateway::google))
        .route("/anthropic", post(gateway::anthropic))
        .route("/v1/chat", post(gateway::unified))
        .route("/pricing", get(admin::list_pricing))
        .route("/users", post(admin::create_user))
        .route("/users/{id}/ledger", get(admin::get_ledger))
}
