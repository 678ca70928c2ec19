//! Anthropic (Claude) Provider
//!
//! Sends normalized messages to the Messages API. System messages are lifted
//! into the top-level `system` field because the API rejects a `system` role
//! inside `messages`. `max_tokens` is mandatory for this provider.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnthropicEndpointConfig;
use crate::providers::types::*;
use crate::providers::{credential, http_client, post_json, Provider, ProviderAdapter, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsageEnvelope {
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct AnthropicAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    version: String,
}

impl AnthropicAdapter {
    pub fn new(config: &AnthropicEndpointConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client(Duration::from_secs(config.endpoint.timeout_secs))?,
            base_url: config
                .endpoint
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: credential(config.endpoint.api_key.as_deref()),
            version: config.version.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_request(
        &self,
        request: &UnifiedRequest,
        messages: &[NormalizedMessage],
        _json_mode: bool,
    ) -> Result<ProviderCall, ProviderError> {
        let max_tokens = request.max_tokens.ok_or_else(|| {
            ProviderError::InvalidRequest("max_tokens is required for anthropic".into())
        })?;

        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.text.as_str())
            .collect();

        let body = AnthropicRequest {
            model: &request.model,
            max_tokens,
            messages: messages
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .map(|m| AnthropicMessage {
                    role: m.role.as_str(),
                    content: &m.text,
                })
                .collect(),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
        };

        Ok(ProviderCall {
            model: request.model.clone(),
            body: serde_json::to_value(&body)?,
        })
    }

    fn send<'a>(
        &'a self,
        call: &'a ProviderCall,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            let key = self
                .api_key
                .as_deref()
                .ok_or(ProviderError::MissingCredential(Provider::Anthropic))?;

            debug!(model = %call.model, "Sending Anthropic request");
            let request = self
                .http
                .post(self.endpoint())
                .header("x-api-key", key)
                .header("anthropic-version", &self.version);
            post_json(request, &call.body).await
        })
    }

    fn extract_usage(&self, body: &[u8]) -> Option<TokenUsage> {
        let envelope: AnthropicUsageEnvelope = serde_json::from_slice(body).ok()?;
        Some(TokenUsage {
            input_tokens: envelope.usage.input_tokens,
            output_tokens: envelope.usage.output_tokens,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
