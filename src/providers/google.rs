//! Google Gemini Provider
//!
//! Converts normalized messages into `generateContent` contents. Gemini only
//! knows the `user` and `model` roles, so `assistant` becomes `model` and
//! everything else (including system text) is sent as `user`. JSON mode is a
//! `generationConfig` directive rather than message text.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderEndpointConfig;
use crate::providers::types::*;
use crate::providers::{credential, http_client, post_json, Provider, ProviderAdapter, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageEnvelope {
    usage_metadata: UsageMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

fn gemini_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::Assistant => "model",
        MessageRole::System | MessageRole::User => "user",
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct GoogleAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleAdapter {
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

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(model)
        )
    }
}

impl ProviderAdapter for GoogleAdapter {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn json_mode_in_config(&self) -> bool {
        true
    }

    fn build_request(
        &self,
        request: &UnifiedRequest,
        messages: &[NormalizedMessage],
        json_mode: bool,
    ) -> Result<ProviderCall, ProviderError> {
        let contents = messages
            .iter()
            .map(|m| Content {
                role: gemini_role(m.role),
                parts: vec![Part { text: &m.text }],
            })
            .collect();

        let generation_config = GenerationConfig {
            response_mime_type: json_mode.then_some("application/json"),
            max_output_tokens: request.max_tokens,
        };
        let generation_config = (generation_config.response_mime_type.is_some()
            || generation_config.max_output_tokens.is_some())
        .then_some(generation_config);

        let body = GenerateContentRequest {
            contents,
            generation_config,
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
                .ok_or(ProviderError::MissingCredential(Provider::Google))?;

            debug!(model = %call.model, "Sending Gemini request");
            let request = self
                .http
                .post(self.endpoint(&call.model))
                .header("x-goog-api-key", key);
            post_json(request, &call.body).await
        })
    }

    fn extract_usage(&self, body: &[u8]) -> Option<TokenUsage> {
        let envelope: UsageEnvelope = serde_json::from_slice(body).ok()?;
        Some(TokenUsage {
            input_tokens: envelope.usage_metadata.prompt_token_count,
            output_tokens: envelope.usage_metadata.candidates_token_count,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
