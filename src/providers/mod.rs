//! LLM Provider Module
//!
//! Defines the [`ProviderAdapter`] trait shared by the OpenAI, Google and
//! Anthropic adapters, the provider error type, and sub-modules for request
//! normalization and pricing.

pub mod anthropic;
pub mod google;
pub mod normalize;
pub mod openai;
pub mod pricing;
pub mod types;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ProvidersConfig;
use crate::providers::types::{NormalizedMessage, ProviderCall, RawResponse, TokenUsage, UnifiedRequest};

// Re-exports for convenience.
pub use self::normalize::RequestNormalizer;
pub use self::pricing::PricingCatalog;

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// The upstream services the gateway can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(alias = "open_ai")]
    OpenAi,
    #[serde(alias = "gemini")]
    Google,
    #[serde(alias = "claude")]
    Anthropic,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Google, Provider::Anthropic];

    /// Stable identifier used in ledger documents and pricing files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Anthropic => "anthropic",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn credential_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Google => "GEMINI_API_KEY",
            Self::Anthropic => "CLAUDE_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "google" | "gemini" => Ok(Self::Google),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            _ => Err(format!("Unknown provider: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// Errors that can occur while shaping or sending a provider request.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{} is not set", .0.credential_env())]
    MissingCredential(Provider),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Error sending request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Error marshalling JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No adapter registered for {0}")]
    NotRegistered(Provider),
}

// ---------------------------------------------------------------------------
// ProviderAdapter trait
// ---------------------------------------------------------------------------

/// Contract every provider adapter implements.
///
/// Async methods return boxed futures so the trait is dyn-compatible (can be
/// used as `Arc<dyn ProviderAdapter>`).
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Whether a credential is available. Does not validate it.
    fn is_configured(&self) -> bool;

    /// Whether JSON output is requested through a request config field.
    /// When true the normalizer adds no hint text for this provider.
    fn json_mode_in_config(&self) -> bool {
        false
    }

    /// Shape the provider wire request. Pure; performs no I/O.
    fn build_request(
        &self,
        request: &UnifiedRequest,
        messages: &[NormalizedMessage],
        json_mode: bool,
    ) -> Result<ProviderCall, ProviderError>;

    /// Send the request and return the status and body untouched.
    ///
    /// Fails with [`ProviderError::MissingCredential`] before any network I/O
    /// when no API key is configured.
    fn send<'a>(
        &'a self,
        call: &'a ProviderCall,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse, ProviderError>> + Send + 'a>>;

    /// Parse token usage out of a response body. `None` when absent or
    /// unparsable.
    fn extract_usage(&self, body: &[u8]) -> Option<TokenUsage>;
}

// ---------------------------------------------------------------------------
// Shared HTTP helpers
// ---------------------------------------------------------------------------

/// Build the shared reqwest client used by an adapter.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// POST a JSON body and collect the raw reply.
pub(crate) async fn post_json(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<RawResponse, ProviderError> {
    let payload = serde_json::to_vec(body)?;
    let resp = request
        .header("content-type", "application/json")
        .body(payload)
        .send()
        .await?;
    let status = resp.status().as_u16();
    let body = resp.bytes().await?;
    Ok(RawResponse { status, body })
}

/// Resolve the API key: non-empty configured value or nothing.
pub(crate) fn credential(api_key: Option<&str>) -> Option<String> {
    api_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
}

// ---------------------------------------------------------------------------
// Adapter registry
// ---------------------------------------------------------------------------

/// Lookup table from [`Provider`] to its adapter.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build all three adapters from configuration.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        let mut registry = Self::new();
        registry.register(Arc::new(openai::OpenAiAdapter::new(&config.openai)?));
        registry.register(Arc::new(google::GoogleAdapter::new(&config.google)?));
        registry.register(Arc::new(anthropic::AnthropicAdapter::new(&config.anthropic)?));
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or(ProviderError::NotRegistered(provider))
    }

    /// Providers in a stable order with their credential status.
    pub fn status(&self) -> Vec<(Provider, bool)> {
        let mut out: Vec<_> = self
            .adapters
            .iter()
            .map(|(p, a)| (*p, a.is_configured()))
            .collect();
        out.sort_by_key(|(p, _)| *p);
        out
    }
}
