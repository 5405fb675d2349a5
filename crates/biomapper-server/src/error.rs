// biomapper-server/src/error.rs
// ============================================================================
// Module: API Error Mapping
// Description: Job manager errors and their HTTP representations.
// Purpose: Keep failure payloads uniform across every endpoint.
// Dependencies: axum, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every endpoint failure maps to one of a small set of API errors, each
//! with a fixed HTTP status and a JSON body `{error, message}`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use thiserror::Error;

// ============================================================================
// SECTION: API Errors
// ============================================================================

/// API surface errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The named strategy is not loaded.
    #[error("strategy not found: {0}")]
    StrategyNotFound(String),
    /// The job identifier is unknown.
    #[error("job not found: {0}")]
    JobNotFound(String),
    /// The submission payload failed validation.
    #[error("invalid request: {0}")]
    Validation(String),
    /// The request conflicts with the job's current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Unclassified server failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::StrategyNotFound(_) | Self::JobNotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable error label used in payloads.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::StrategyNotFound(_) => "strategy_not_found",
            Self::JobNotFound(_) => "job_not_found",
            Self::Validation(_) => "validation_failed",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = axum::Json(serde_json::json!({
            "error": self.label(),
            "message": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}
