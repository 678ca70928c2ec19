//! Gateway request handling.
//!
//! [`GatewayHandler`] runs one provider call end to end: validation,
//! normalization, pre-flight checks, the provider round trip and billing.
//! Once the provider has answered, its status and body are relayed verbatim;
//! billing problems after that point are logged and never replace the reply.

use axum::body::Bytes;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ExistencePolicy;
use crate::error::AppError;
use crate::ledger::{validate_model_key, UsageLedger};
use crate::providers::normalize::ValidationError;
use crate::providers::types::{ProviderResponse, UnifiedRequest};
use crate::providers::{AdapterRegistry, Provider, ProviderError, RequestNormalizer};

/// Provider reply relayed to the caller.
#[derive(Debug, Clone)]
pub struct GatewayReply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl From<ProviderResponse> for GatewayReply {
    fn from(resp: ProviderResponse) -> Self {
        Self {
            status: StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY),
            body: resp.body,
        }
    }
}

impl IntoResponse for GatewayReply {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "application/json")],
            self.body,
        )
            .into_response()
    }
}

pub struct GatewayHandler {
    registry: AdapterRegistry,
    normalizer: RequestNormalizer,
    ledger: UsageLedger,
}

impl GatewayHandler {
    pub fn new(registry: AdapterRegistry, normalizer: RequestNormalizer, ledger: UsageLedger) -> Self {
        Self {
            registry,
            normalizer,
            ledger,
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Handle a request for the provider named by the route.
    pub async fn handle(&self, provider: Provider, request: UnifiedRequest) -> Result<GatewayReply, AppError> {
        let request_id = Uuid::new_v4();
        validate(provider, &request)?;

        let adapter = self.registry.get(provider)?;
        let messages = self.normalizer.normalize(&request, !adapter.json_mode_in_config())?;
        let json_mode = self.normalizer.json_mode(request.output_json);

        let call = adapter.build_request(&request, &messages, json_mode)?;

        // Configuration and account problems are reported before any tokens
        // are spent.
        if !adapter.is_configured() {
            return Err(ProviderError::MissingCredential(provider).into());
        }
        self.ledger.pricing().lookup(provider, &request.model)?;
        if self.ledger.policy() == ExistencePolicy::Strict && !self.ledger.user_exists(&request.user_id).await? {
            return Err(AppError::NotFound(format!("User {} not found", request.user_id)));
        }

        info!(
            request_id = %request_id,
            user_id = %request.user_id,
            provider = %provider,
            model = %request.model,
            json_mode,
            messages = messages.len(),
            "Forwarding request"
        );

        let raw = adapter.send(&call).await?;
        let success = raw.is_success();
        let usage = success.then(|| adapter.extract_usage(&raw.body)).flatten();
        let response = ProviderResponse {
            status: raw.status,
            body: raw.body,
            usage,
        };

        if !success {
            warn!(
                request_id = %request_id,
                provider = %provider,
                status = response.status,
                "Provider returned an error; ledger not updated"
            );
            return Ok(response.into());
        }

        let Some(usage) = response.usage else {
            warn!(
                request_id = %request_id,
                provider = %provider,
                model = %request.model,
                "Provider response has no usage block; ledger not updated"
            );
            return Ok(response.into());
        };

        match self
            .ledger
            .apply(&request.user_id, provider, &request.model, usage)
            .await
        {
            Ok(totals) => info!(
                request_id = %request_id,
                user_id = %request.user_id,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                input_cost = totals.input_cost,
                output_cost = totals.output_cost,
                "Usage recorded"
            ),
            Err(e) => error!(
                request_id = %request_id,
                user_id = %request.user_id,
                provider = %provider,
                model = %request.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                error = %e,
                "Failed to record usage"
            ),
        }

        Ok(response.into())
    }
}

fn validate(provider: Provider, request: &UnifiedRequest) -> Result<(), ValidationError> {
    if request.user_id.trim().is_empty() {
        return Err(ValidationError("user_id is required".into()));
    }
    if request.model.trim().is_empty() {
        return Err(ValidationError("model is required".into()));
    }
    validate_model_key(&request.model).map_err(|e| ValidationError(e.to_string()))?;
    if let Some(requested) = request.provider {
        if requested != provider {
            return Err(ValidationError(format!(
                "provider {requested} does not match route /{provider}"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
