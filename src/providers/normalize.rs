//! Request normalization.
//!
//! Turns a [`UnifiedRequest`] into the provider-neutral message list every
//! adapter consumes. The default system prompt and the JSON-mode hint are
//! applied here, once, so all providers see the same conversation.

use crate::config::NormalizerConfig;
use crate::providers::types::{MessageRole, NormalizedMessage, UnifiedRequest};

/// Suffix appended to the synthesized system prompt in JSON mode.
pub const JSON_HINT_SUFFIX: &str = "\nResponse Format: JSON";

/// Standalone system message prepended to caller messages in JSON mode.
pub const JSON_HINT_MESSAGE: &str = "Response Format: JSON";

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

#[derive(Debug, Clone)]
pub struct RequestNormalizer {
    default_system_prompt: String,
    json_mode_default: bool,
}

impl RequestNormalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        Self {
            default_system_prompt: config.default_system_prompt.clone(),
            json_mode_default: config.json_mode_default,
        }
    }

    /// Resolve the tri-state output flag against the configured default.
    pub fn json_mode(&self, flag: Option<bool>) -> bool {
        flag.unwrap_or(self.json_mode_default)
    }

    /// Build the neutral message list.
    ///
    /// `hint_in_text` is false for providers that request JSON output through
    /// their own config field; those get no hint text at all.
    pub fn normalize(
        &self,
        request: &UnifiedRequest,
        hint_in_text: bool,
    ) -> Result<Vec<NormalizedMessage>, ValidationError> {
        let text_hint = hint_in_text && self.json_mode(request.output_json);

        if request.messages.is_empty() {
            let prompt = request
                .prompt
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ValidationError("Either prompt or messages must be provided".into()))?;

            let mut system = request
                .system_prompt
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| self.default_system_prompt.clone());
            if text_hint {
                system.push_str(JSON_HINT_SUFFIX);
            }

            return Ok(vec![NormalizedMessage::system(system), NormalizedMessage::user(prompt)]);
        }

        let mut out = Vec::with_capacity(request.messages.len() + 1);
        if text_hint {
            out.push(NormalizedMessage::system(JSON_HINT_MESSAGE));
        }
        for (index, msg) in request.messages.iter().enumerate() {
            let role: MessageRole = msg
                .role
                .parse()
                .map_err(|e: String| ValidationError(format!("messages[{index}]: {e}")))?;
            out.push(NormalizedMessage {
                role,
                text: msg.content.clone(),
            });
        }
        Ok(out)
    }
}
