//! HTTP error mapping: domain error kinds onto response statuses with
//! `{"detail": ...}` bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::DomainError;

pub struct ApiError(pub DomainError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        ApiError(error)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError(DomainError::Internal(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DomainError::Validation(_) | DomainError::Broker { .. } => StatusCode::BAD_REQUEST,
            DomainError::Auth(_) => StatusCode::UNAUTHORIZED,
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::TransientSync(_)
            | DomainError::Crypto(_)
            | DomainError::Fatal(_)
            | DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Absent resources are expected; everything else 5xx-worthy is
        // logged with its cause
        match &self.0 {
            DomainError::NotFound(_) => {}
            DomainError::Validation(_) | DomainError::Auth(_) => {
                tracing::debug!("Request rejected: {}", self.0);
            }
            other => {
                tracing::error!("Request failed: {}", other);
            }
        }

        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}
