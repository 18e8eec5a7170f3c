// src/error.rs
use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures surfaced by the poll stores.
///
/// Malformed identifiers are reported as `NotFound`, never as a separate
/// validation failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflicting record")]
    Conflict,

    #[error("invalid sort field: {0}")]
    InvalidSortField(String),

    #[error("constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("storage operation timed out")]
    Timeout,

    #[error("storage error: {0}")]
    Storage(sqlx::Error),
}

impl StoreError {
    /// True for connectivity, timeout, check constraint and unclassified
    /// database failures.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            StoreError::ConstraintViolation(_) | StoreError::Timeout | StoreError::Storage(_)
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict,
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_check_violation() => {
                StoreError::ConstraintViolation(db.constraint().unwrap_or("check").to_string())
            }
            other => StoreError::Storage(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("the requested resource could not be found")]
    NotFound,

    #[error("you have already voted on this poll")]
    AlreadyVoted,

    #[error("invalid or missing authentication token")]
    InvalidToken,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("validation failed")]
    Validation(HashMap<String, String>),

    #[error("the server encountered a problem and could not process your request")]
    Internal(#[source] StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Conflict => ApiError::AlreadyVoted,
            StoreError::InvalidSortField(field) => {
                let mut errors = HashMap::new();
                errors.insert("sort".to_string(), format!("invalid sort value {field:?}"));
                ApiError::Validation(errors)
            }
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::AlreadyVoted => StatusCode::CONFLICT,
            ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unprocessable(_) | ApiError::Validation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Internal(ref source) => {
                error!(error = %source, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = match self {
            ApiError::Validation(errors) => json!({ "error": errors }),
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
