//! HTTP mapping of service errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pecoin_core::Error;
use serde_json::json;
use tracing::error;

/// Service error rendered as `{ "error": message }`
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(Error::ValidationError(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::ValidationError(_) => StatusCode::BAD_REQUEST,
            Error::EntityNotFound { .. } => StatusCode::NOT_FOUND,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            e if e.is_transient() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
