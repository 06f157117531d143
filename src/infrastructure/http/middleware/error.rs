use crate::domain::errors::DomainError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    RequestTimeout(String),
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::RequestTimeout(msg) => write!(f, "Request timeout: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::RequestTimeout(msg) => (StatusCode::REQUEST_TIMEOUT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::PayloadMissing(field) => {
                ApiError::BadRequest(format!("Error retrieving file field '{}'", field))
            }
            DomainError::ResourceNotFound(_) => ApiError::NotFound("No image found".to_string()),
            DomainError::LockTimeout { .. } => {
                ApiError::RequestTimeout("Timeout waiting for mutex".to_string())
            }
            DomainError::PayloadReadError(msg) => {
                tracing::error!("Error reading upload: {}", msg);
                ApiError::Internal("Error reading file".to_string())
            }
            DomainError::StoreUnavailable(msg) => {
                tracing::error!("Store error: {}", msg);
                ApiError::Internal("Storage backend unavailable".to_string())
            }
            DomainError::InvalidTtl(ttl) => {
                tracing::error!("Rejected lease TTL {:?}", ttl);
                ApiError::Internal("Invalid lock configuration".to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
