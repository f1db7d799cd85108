use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("room is full")]
    AdmissionRejected,

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("call failed: {0}")]
    Call(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error body returned by HTTP handlers
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AdmissionRejected => StatusCode::SERVICE_UNAVAILABLE,
            Self::Validation(_) | Self::Call(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::QuotaExceeded => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Internal failures are logged with context and surfaced opaquely;
        // everything else is an expected outcome reported as-is.
        let message = match &self {
            Self::Internal(err) => {
                error!("internal error: {:#}", err);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (self.status_code(), Json(ErrorResponse { error: message })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
