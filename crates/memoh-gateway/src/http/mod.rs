pub mod chat;
pub mod health;
pub mod webhooks;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use memoh_core::error::MemohError;
use serde_json::json;

/// Wraps `MemohError` for handlers so `?` works against `axum::response::Response`.
/// Maps the error taxonomy onto HTTP status per the documented status table.
pub struct ApiError(pub MemohError);

impl From<MemohError> for ApiError {
    fn from(e: MemohError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MemohError::Validation(_) => StatusCode::BAD_REQUEST,
            MemohError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            MemohError::Gateway(_)
            | MemohError::GatewayParse(_)
            | MemohError::StreamDecode(_)
            | MemohError::Platform(_)
            | MemohError::Http(_) => StatusCode::BAD_GATEWAY,
            MemohError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            MemohError::Storage(_)
            | MemohError::Config(_)
            | MemohError::Serialization(_)
            | MemohError::Io(_)
            | MemohError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
        }));
        (status, body).into_response()
    }
}
