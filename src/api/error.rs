//! Unified API error handling
//!
//! This module provides a consistent error response format across all API endpoints.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbError;
use crate::service::{InferenceError, WorkflowError};

/// Standard error response format
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Unique request ID for tracing
    pub request_id: String,
}

/// Unified API error type
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Bad request / validation error (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(String),

    /// Inference runtime error (502)
    #[error("Inference runtime error: {0}")]
    ExternalService(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_type = match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Database(_) => "database_error",
            ApiError::ExternalService(_) => "external_service_error",
        };

        tracing::error!(
            error_type = error_type,
            status = status.as_u16(),
            message = %self,
            "API error"
        );

        HttpResponse::build(status).json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            request_id: Uuid::new_v4().to_string(),
        })
    }
}

/// HTTP status for a failed extraction run
pub fn workflow_status(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::InvalidRequest(_) | WorkflowError::UnknownModel(_) => {
            StatusCode::BAD_REQUEST
        }
        WorkflowError::InferenceUnavailable { .. } => StatusCode::BAD_GATEWAY,
        WorkflowError::PersistenceWriteFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// From conversions for service errors
// ============================================================================

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        ApiError::Database(err.to_string())
    }
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        ApiError::ExternalService(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_status_codes() {
        assert_eq!(
            workflow_status(&WorkflowError::UnknownModel("gpt-4o".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            workflow_status(&WorkflowError::InferenceUnavailable {
                stage: "triage".into(),
                message: "refused".into(),
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            workflow_status(&WorkflowError::PersistenceWriteFailure {
                run_id: "run".into(),
                message: "pool timed out".into(),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::BadRequest("empty case id".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(InferenceError::Unavailable("refused".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
