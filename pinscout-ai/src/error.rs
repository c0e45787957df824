//! Error types for pinscout-ai

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::Stage;

/// Workflow-level failures
///
/// Item classification failures never appear here: they become
/// Disqualified verdicts inside the batch validator.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Unknown prompt or run id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request, rejected before any stage runs
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A stage's work unit reported failure
    #[error("Stage {stage} failed: {detail}")]
    StageFailed { stage: Stage, detail: String },

    /// Persistence failure (stage status, item results)
    #[error("Store error: {0}")]
    Store(#[from] pinscout_common::Error),
}

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// pinscout-common error
    #[error("Common error: {0}")]
    Common(#[from] pinscout_common::Error),
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::NotFound(msg) => ApiError::NotFound(msg),
            WorkflowError::InvalidInput(msg) => ApiError::BadRequest(msg),
            WorkflowError::StageFailed { .. } => ApiError::Internal(err.to_string()),
            WorkflowError::Store(e) => ApiError::Common(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(pinscout_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(pinscout_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_errors_map_to_http_status() {
        let not_found: ApiError = WorkflowError::NotFound("prompt x".to_string()).into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let invalid: ApiError = WorkflowError::InvalidInput("empty".to_string()).into();
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);

        let store: ApiError =
            WorkflowError::Store(pinscout_common::Error::Internal("disk".to_string())).into();
        assert_eq!(store.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_stage_failed_message_names_stage() {
        let err = WorkflowError::StageFailed {
            stage: Stage::Acquisition,
            detail: "No pins were scraped".to_string(),
        };
        assert_eq!(err.to_string(), "Stage acquisition failed: No pins were scraped");
    }
}
