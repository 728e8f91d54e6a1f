//! HTTP error envelope
//!
//! Every error leaves the API as `{"error":{"code":...,"message":...}}`
//! with the status the common taxonomy dictates. Handlers return
//! `Result<_, ApiError>` and rely on `?` with `From<Error>`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use s3browser_common::Error;
use serde::Serialize;

/// Transport-layer wrapper around the common error type.
#[derive(Debug)]
pub struct ApiError(pub Error);

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.0.api_code(),
                message: self.0.to_string(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

impl ApiError {
    /// Shorthand for the middleware's unauthorized rejection.
    #[must_use]
    pub fn unauthorized(message: &str) -> Self {
        Self(Error::unauthorized(message))
    }
}
