//! Error types for the HTTP gateway

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use conveyor_pipeline::SubmitError;

/// Result type for gateway handlers
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gateway handlers
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request is malformed or names an unsupported artifact
    #[error("{0}")]
    BadRequest(String),

    /// Content was already submitted
    #[error("{0}")]
    Conflict(String),

    /// No job with the requested identifier
    #[error("job {0} not found")]
    JobNotFound(String),

    /// Server socket could not be bound or served
    #[error("server error: {0}")]
    Server(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            Error::JobNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::Server(_) | Error::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<SubmitError> for Error {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Duplicate { .. } => Error::Conflict(e.to_string()),
            SubmitError::InvalidArtifact { .. } => Error::BadRequest(e.to_string()),
            SubmitError::Pipeline(inner) => Error::Internal(inner.to_string()),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for Error {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        Error::BadRequest(format!("invalid multipart body: {}", e))
    }
}
