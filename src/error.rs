use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use diesel::result::DatabaseErrorKind;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::events::attendance::AttendanceReason;

pub type ApiResult<T> = Result<T, ApiError>;

/// One validation problem, tied to the question that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionError {
    pub question_id: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("feedback form not found or inactive")]
    FormNotFound,
    #[error("authentication required")]
    Unauthorized,
    #[error("attendance requirement not met: {0}")]
    AttendanceRequired(AttendanceReason),
    #[error("one or more answers failed validation")]
    ValidationFailed(Vec<QuestionError>),
    #[error("feedback for this form has already been submitted")]
    AlreadySubmitted,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("insufficient permissions")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("storage failure")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("duplicate row")]
    Duplicate,
    #[error("database error: {0}")]
    Database(diesel::result::Error),
    #[error("connection pool unavailable: {0}")]
    Pool(String),
}

impl From<diesel::result::Error> for StorageError {
    fn from(error: diesel::result::Error) -> Self {
        match error {
            diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            ) => StorageError::Duplicate,
            other => StorageError::Database(other),
        }
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(error: diesel::result::Error) -> Self {
        ApiError::Storage(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::FormNotFound => (StatusCode::NOT_FOUND, "form_not_found"),
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            ApiError::AttendanceRequired(_) => {
                (StatusCode::FORBIDDEN, "attendance_required")
            }
            ApiError::ValidationFailed(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed")
            }
            ApiError::AlreadySubmitted => {
                (StatusCode::CONFLICT, "already_submitted")
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_failure")
            }
        };

        let details = match &self {
            ApiError::AttendanceRequired(reason) => {
                json!({ "reason": reason.as_str() })
            }
            ApiError::ValidationFailed(problems) => {
                json!({ "questions": problems })
            }
            _ => serde_json::Value::Null,
        };

        if let ApiError::Storage(error) = &self {
            tracing::error!(%error, "request failed on storage");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
                "details": details,
            }
        }));

        (status, body).into_response()
    }
}
