use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use gatemeter::AppState;
use gatemeter::api;
use gatemeter::config::{Config, ExistencePolicy, NormalizerConfig};
use gatemeter::db::Database;
use gatemeter::providers::types::{NormalizedMessage, UnifiedRequest};
use gatemeter::providers::{PricingCatalog, ProviderAdapter, RequestNormalizer};

pub const PRICES: &str = r#"{
    "openai": {
        "gpt-3.5-turbo": {"input": 0.50, "output": 1.50},
        "gpt-4.1": {"input": 2.00, "output": 8.00}
    },
    "google": {
        "gemini-1.5-flash": {"input": 0.075, "output": 0.30},
        "gemini-2.0-pro": {"input": 1.25, "output": 5.00}
    },
    "anthropic": {
        "claude-3-haiku": {"input": 0.25, "output": 1.25},
        "claude-3.5-sonnet": {"input": 3.00, "output": 15.00}
    }
}"#;

pub fn request(value: serde_json::Value) -> UnifiedRequest {
    serde_json::from_value(value).unwrap()
}

pub fn normalized<A: ProviderAdapter>(adapter: &A, req: &UnifiedRequest) -> Vec<NormalizedMessage> {
    RequestNormalizer::new(&NormalizerConfig::default())
        .normalize(req, !adapter.json_mode_in_config())
        .unwrap()
}

/// Config with every provider pointed at `mock_uri` under a per-provider prefix.
pub fn config_for(mock_uri: &str, policy: ExistencePolicy) -> Config {
    let mut config = Config::default();
    config.ledger.existence_policy = policy;

    config.providers.openai.base_url = Some(format!("{mock_uri}/openai/v1"));
    config.providers.openai.api_key = Some("sk-test".into());
    config.providers.google.base_url = Some(format!("{mock_uri}/google/v1beta"));
    config.providers.google.api_key = Some("g-test".into());
    config.providers.anthropic.endpoint.base_url = Some(format!("{mock_uri}/anthropic/v1"));
    config.providers.anthropic.endpoint.api_key = Some("a-test".into());
    config
}

pub fn state(mock_uri: &str, policy: ExistencePolicy) -> AppState {
    let pricing = PricingCatalog::from_json(PRICES).unwrap();
    AppState::build(
        config_for(mock_uri, policy),
        Database::open_in_memory().unwrap(),
        Arc::new(pricing),
    )
    .unwrap()
}

pub fn app(state: &AppState) -> Router {
    api::build_api_router().with_state(state.clone())
}

/// Send a request and return the status plus the raw body bytes.
pub async fn call(app: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
    let mut req = Request::builder().method(method).uri(uri);
    if body.is_some() {
        req = req.header("content-type", "application/json");
    }
    let req = req
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

pub async fn call_json(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let (status, bytes) = call(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}
