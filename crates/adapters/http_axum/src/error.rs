//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use greenhub_domain::error::{GreenHubError, ValidationError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`GreenHubError`] to an HTTP response with appropriate status code.
pub struct ApiError(GreenHubError);

impl From<GreenHubError> for ApiError {
    fn from(err: GreenHubError) -> Self {
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
        let (status, message) = match &self.0 {
            GreenHubError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            GreenHubError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            GreenHubError::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            GreenHubError::Bus(err) => {
                tracing::error!(error = %err, "message bus error");
                (StatusCode::BAD_GATEWAY, "message bus unavailable".to_string())
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
