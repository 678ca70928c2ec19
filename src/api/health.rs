use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProviderStatus {
    pub provider: String,
    pub configured: bool,
    /// Variable that supplies the credential. The key itself is never shown.
    pub credential_env: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
    pub providers: Vec<ProviderStatus>,
}

/// GET /
pub async fn banner() -> &'static str {
    concat!("gatemeter ", env!("CARGO_PKG_VERSION"), " -- LLM gateway with usage metering\n")
}

/// GET /health
///
/// Liveness plus per-provider credential status.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let providers = state
        .gateway
        .registry()
        .status()
        .into_iter()
        .map(|(provider, configured)| ProviderStatus {
            provider: provider.to_string(),
            configured,
            credential_env: provider.credential_env(),
        })
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION"),
        providers,
    })
}
