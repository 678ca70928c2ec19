//! OpenAI Provider
//!
//! Sends normalized messages to `{base}/chat/completions` with bearer auth.
//! JSON mode maps to `response_format: {"type": "json_object"}`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderEndpointConfig;
use crate::providers::types::*;
use crate::providers::{credential, http_client, post_json, Provider, ProviderAdapter, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsageEnvelope {
    usage: OpenAiUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct OpenAiAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiAdapter {
    pub fn new(config: &ProviderEndpointConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client(Duration::from_secs(config.timeout_secs))?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: credential(config.api_key.as_deref()),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_request(
        &self,
        request: &UnifiedRequest,
        messages: &[NormalizedMessage],
        json_mode: bool,
    ) -> Result<ProviderCall, ProviderError> {
        let body = OpenAiRequest {
            model: &request.model,
            messages: messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: m.role.as_str(),
                    content: &m.text,
                })
                .collect(),
            response_format: json_mode.then_some(ResponseFormat { kind: "json_object" }),
            max_tokens: request.max_tokens,
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
                .ok_or(ProviderError::MissingCredential(Provider::OpenAi))?;

            debug!(model = %call.model, "Sending OpenAI request");
            let request = self.http.post(self.endpoint()).bearer_auth(key);
            post_json(request, &call.body).await
        })
    }

    fn extract_usage(&self, body: &[u8]) -> Option<TokenUsage> {
        let envelope: OpenAiUsageEnvelope = serde_json::from_slice(body).ok()?;
        Some(TokenUsage {
            input_tokens: envelope.usage.prompt_tokens,
            output_tokens: envelope.usage.completion_tokens,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
