//! HTTP error type. Every handler returns `Result<_, ApiError>`; the body is
//! always `{"error": "...", "code": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::domains::assistant::AssistantError;
use crate::domains::pipelines::PipelineError;
use crate::domains::scheduling::TaskValidationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("internal server error")]
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl ApiError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} not found", what))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Conflict(_) => "conflict",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::BadGateway(_) => "bad_gateway",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            error!(error = %format!("{:#}", e), "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };
        (self.status(), Json(body)).into_response()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(validation) = err.downcast_ref::<TaskValidationError>() {
            return ApiError::BadRequest(validation.to_string());
        }
        if let Some(db) = err.downcast_ref::<sqlx::Error>() {
            if matches!(db, sqlx::Error::RowNotFound) {
                return ApiError::NotFound("record not found".to_string());
            }
            if is_unique_violation(db) {
                return ApiError::Conflict("a record with these values already exists".to_string());
            }
        }
        ApiError::Internal(err)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::UnknownPipeline(_) => ApiError::NotFound(err.to_string()),
            PipelineError::InvalidInput { .. } => ApiError::BadRequest(err.to_string()),
            PipelineError::TriggerNotAllowed { .. } => ApiError::Forbidden(err.to_string()),
            PipelineError::AlreadyRunning { .. } => ApiError::Conflict(err.to_string()),
            PipelineError::Store(e) => ApiError::Internal(e),
        }
    }
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::NotConfigured => ApiError::Unavailable(err.to_string()),
            AssistantError::Ai(e) => ApiError::BadGateway(format!("assistant model call failed: {:#}", e)),
        }
    }
}
