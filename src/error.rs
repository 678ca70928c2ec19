use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::ledger::LedgerError;
use crate::providers::ProviderError;
use crate::providers::normalize::ValidationError;
use crate::providers::pricing::PricingError;

/// Unified application error type. Renders as `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Missing credential or price; the deployment, not the caller, is at fault.
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Config(_) | Self::Transport(_) | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::BadRequest(err.0)
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match &err {
            ProviderError::InvalidRequest(msg) => Self::BadRequest(msg.clone()),
            ProviderError::MissingCredential(_) => Self::Config(err.to_string()),
            ProviderError::Http(_) => {
                tracing::error!(error = %err, "Provider transport error");
                Self::Transport(err.to_string())
            }
            ProviderError::Serialization(_) | ProviderError::NotRegistered(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        match &err {
            PricingError::NotFound { .. } => Self::Config(err.to_string()),
            PricingError::Invalid(_) | PricingError::Io(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UserNotFound(_) => Self::NotFound(err.to_string()),
            LedgerError::UserExists(_) => Self::Conflict(err.to_string()),
            LedgerError::InvalidKey(msg) => Self::BadRequest(msg),
            LedgerError::Pricing(e) => e.into(),
            LedgerError::Persistence(msg) => {
                tracing::error!(error = %msg, "Ledger storage error");
                Self::Database(msg)
            }
        }
    }
}
