use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use midword_core::error::{GuessRejection, MidwordError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Rejected(#[from] GuessRejection),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Service unavailable: {0}")]
    Transient(String),

    #[error("Not Found")]
    NotFound,

    #[error("Internal Server Error: {0}")]
    Any(#[from] anyhow::Error),
}

impl From<MidwordError> for AppError {
    fn from(e: MidwordError) -> Self {
        match e {
            MidwordError::Rejected(r) => AppError::Rejected(r),
            MidwordError::Integrity(s) => AppError::Integrity(s),
            MidwordError::Transient(s) => AppError::Transient(s),
            MidwordError::Config(s) => AppError::Validation(s),
            MidwordError::Json(e) => AppError::Serde(e),
            MidwordError::Io(e) => AppError::Any(e.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            AppError::Database(e) => {
                tracing::error!("Database Error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Serde(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Rejected(r) => {
                let status = match r {
                    GuessRejection::NotAuthenticated => StatusCode::UNAUTHORIZED,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, r.to_string())
            }
            AppError::Validation(s) => (StatusCode::BAD_REQUEST, s),
            AppError::Integrity(s) => {
                tracing::error!("Integrity Error: {}", s);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Transient(s) => {
                tracing::warn!("Collaborator unavailable: {}", s);
                (StatusCode::SERVICE_UNAVAILABLE, s)
            }
            AppError::NotFound => (StatusCode::NOT_FOUND, "Resource not found".to_string()),
            AppError::Any(e) => {
                tracing::error!("Internal Error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": msg }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
