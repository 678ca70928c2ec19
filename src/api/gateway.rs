use axum::body::Bytes;
use axum::extract::State;

use crate::AppState;
use crate::error::AppError;
use crate::gateway::GatewayReply;
use crate::providers::Provider;
use crate::providers::types::UnifiedRequest;

fn parse(body: &[u8]) -> Result<UnifiedRequest, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        AppError::BadRequest("Cannot parse JSON".into())
    })
}

async fn dispatch(state: &AppState, provider: Provider, body: &[u8]) -> Result<GatewayReply, AppError> {
    let request = parse(body)?;
    state.gateway.handle(provider, request).await
}

/// POST /openai
pub async fn openai(State(state): State<AppState>, body: Bytes) -> Result<GatewayReply, AppError> {
    dispatch(&state, Provider::OpenAi, &body).await
}

/// POST /google
pub async fn google(State(state): State<AppState>, body: Bytes) -> Result<GatewayReply, AppError> {
    dispatch(&state, Provider::Google, &body).await
}

/// POST /anthropic
pub async fn anthropic(State(state): State<AppState>, body: Bytes) -> Result<GatewayReply, AppError> {
    dispatch(&state, Provider::Anthropic, &body).await
}

/// POST /v1/chat
///
/// Same contract as the per-provider routes, with the provider named by the
/// request's `provider` field.
pub async fn unified(State(state): State<AppState>, body: Bytes) -> Result<GatewayReply, AppError> {
    let request = parse(&body)?;
    let provider = request
        .provider
        .ok_or_else(|| AppError::BadRequest("provider is required".into()))?;
    state.gateway.handle(provider, request).await
}
