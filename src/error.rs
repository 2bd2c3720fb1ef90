//! HTTP-facing error type
//!
//! Services report their own error enums; handlers funnel them into
//! [`AppError`], which renders as `{ "error": "..." }` with the matching
//! status code.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::artifact_store::StoreError;
use crate::services::media_generator::GeneratorError;
use crate::services::orchestrator::OrchestratorError;
use crate::services::payment_gate::GateError;
use crate::services::paypal::PaymentError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    PaymentRequired(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Io(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::Upstream(_) | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Prefix the message with the failing operation, keeping the status
    pub fn context(self, what: &str) -> Self {
        match self {
            AppError::Upstream(msg) => AppError::Upstream(format!("{}: {}", what, msg)),
            AppError::Io(msg) => AppError::Io(format!("{}: {}", what, msg)),
            other => other,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::warn!(status = %status, error = %self, "Request rejected");
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

/// Malformed or mistyped request bodies are client errors
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<GeneratorError> for AppError {
    fn from(err: GeneratorError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl From<&StoreError> for AppError {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::InvalidPath(_) | StoreError::NotFound(_) => {
                AppError::Validation(err.to_string())
            }
            _ => AppError::Io(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::from(&err)
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl From<GateError> for AppError {
    fn from(err: GateError) -> Self {
        AppError::PaymentRequired(err.to_string())
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Validation(msg) => AppError::Validation(msg),
            OrchestratorError::Generator(e) => e.into(),
            OrchestratorError::Storage(e) => AppError::from(e.as_ref()),
            other => AppError::Upstream(other.to_string()),
        }
    }
}
