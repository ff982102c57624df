//! HTTP mapping for the core error taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use scribe_core::Error;

/// Wrapper giving [`scribe_core::Error`] an HTTP representation.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) | Error::SessionNotFound(_) | Error::JobNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::PlanLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Transcription(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details never leak to clients.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(
                subsystem = "api",
                error = %self.0,
                "Internal error while handling request"
            );
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };

        let mut body = json!({ "error": message });
        if let Error::PlanLimitExceeded { limit, .. } = &self.0 {
            body["limit"] = json!(limit.as_str());
        }
        if self.0.is_retryable() {
            body["retryable"] = json!(true);
        }

        (status, Json(body)).into_response()
    }
}
