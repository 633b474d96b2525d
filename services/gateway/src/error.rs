//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use types::errors::OesError;

/// Wrapper turning domain errors into HTTP responses with a stable code
/// and human-readable detail.
#[derive(Debug)]
pub struct AppError(pub OesError);

impl From<OesError> for AppError {
    fn from(err: OesError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OesError::Validation(_)
            | OesError::InsufficientFunds { .. }
            | OesError::InsufficientPosition { .. }
            | OesError::NotFillable
            | OesError::InvalidAmend(_) => StatusCode::BAD_REQUEST,
            OesError::UnknownOrder(_) | OesError::UnknownAccount(_) => StatusCode::NOT_FOUND,
            OesError::AlreadyTerminal { .. } | OesError::Stale => StatusCode::CONFLICT,
            OesError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            OesError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "code": self.0.code(),
            "detail": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
