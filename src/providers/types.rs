use serde::{Deserialize, Serialize};

use crate::providers::Provider;

/// Provider-agnostic chat request accepted by every gateway route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnifiedRequest {
    #[serde(default, alias = "id_user")]
    pub user_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub provider: Option<Provider>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Tri-state: `None` falls back to the configured default.
    #[serde(default, alias = "output_JSON")]
    pub output_json: Option<bool>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// A caller-supplied message. The role stays a plain string until
/// normalization so an unknown role becomes a validation error rather than
/// a JSON parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("Unsupported message role: {other}")),
        }
    }
}

/// Provider-neutral message produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMessage {
    pub role: MessageRole,
    pub text: String,
}

impl NormalizedMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
        }
    }
}

/// Token counts reported by a provider, trusted verbatim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A fully shaped outbound request, ready for [`ProviderAdapter::send`].
///
/// [`ProviderAdapter::send`]: crate::providers::ProviderAdapter::send
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub model: String,
    pub body: serde_json::Value,
}

/// Raw provider reply: status and body exactly as received.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: bytes::Bytes,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Provider response with usage parsed out of the body, if present.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: bytes::Bytes,
    pub usage: Option<TokenUsage>,
}
