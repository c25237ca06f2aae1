//! Error types for modelrelay
//!
//! All errors implement `IntoResponse` for Axum handlers.

use crate::router::{FailureClass, FailureLog};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    /// No model catalog could be obtained, fresh or stale
    #[error("Model catalog unavailable: {reason}")]
    CatalogUnavailable { reason: String },

    /// Candidate selection produced an empty list
    #[error("No candidate models available: {reason}")]
    NoCandidatesAvailable { reason: String },

    /// Every candidate was tried and failed
    #[error("All {} candidate attempts failed: {failures}", failures.len())]
    AllCandidatesFailed { failures: FailureLog },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::CatalogUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Self::NoCandidatesAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::AllCandidatesFailed { failures } => {
                if failures.all(FailureClass::RateLimited) {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::BAD_GATEWAY
                }
            }
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            Self::AllCandidatesFailed { failures } => Json(serde_json::json!({
                "error": self.to_string(),
                "failures": failures,
            })),
            _ => Json(serde_json::json!({
                "error": self.to_string(),
            })),
        };

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
