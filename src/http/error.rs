use axum::{
    extract::rejection::JsonRejection,
    extract::multipart::MultipartError,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::error::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) | Self::InvalidState(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Expired(_) => StatusCode::GONE,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Provider and internal details stay in the log
        let message = match &self {
            Self::Upstream(_) => {
                error!("Upstream failure: {}", self);
                "upstream service failed, please retry".to_string()
            }
            Self::Config(_) => {
                error!("Service not configured: {}", self);
                "service not available".to_string()
            }
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!("Request failed: {}", self);
                "internal error".to_string()
            }
            _ => self.to_string(),
        };
        let body = Json(ErrorResponse { error: message });

        if let Self::RateLimited { retry_after_secs } = self {
            return (status, [(header::RETRY_AFTER, retry_after_secs.to_string())], body).into_response();
        }
        (status, body).into_response()
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartError> for Error {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(e.body_text())
        } else {
            Self::Validation(e.body_text())
        }
    }
}
