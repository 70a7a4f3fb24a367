//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use vigil_domain::error::{ValidationError, VigilError};

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Turns a [`VigilError`] into a JSON error response.
///
/// Client mistakes carry their message; server-side failures are logged and
/// answered with a generic body.
#[derive(Debug)]
pub struct ApiError(VigilError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            VigilError::Validation(_) | VigilError::Parse(_) => StatusCode::BAD_REQUEST,
            VigilError::NotFound(_) => StatusCode::NOT_FOUND,
            VigilError::Configuration(_) | VigilError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn message(&self) -> String {
        match &self.0 {
            VigilError::Validation(err) => err.to_string(),
            VigilError::Parse(err) => err.to_string(),
            VigilError::NotFound(err) => err.to_string(),
            VigilError::Configuration(_) | VigilError::Storage(_) => {
                "internal server error".to_string()
            }
        }
    }
}

impl From<VigilError> for ApiError {
    fn from(err: VigilError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self.0, "request failed");
        }
        (status, Json(ErrorBody { error: self.message() })).into_response()
    }
}
