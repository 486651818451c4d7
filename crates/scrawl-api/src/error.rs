use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use scrawl_core::models::RemoteNote;
use scrawl_core::RemoteError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Note not found")]
    NotFound,
    #[error("Note already exists")]
    AlreadyExists(Box<RemoteNote>),
    #[error("Version mismatch")]
    VersionMismatch(Box<RemoteNote>),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON error body; conflicts also carry the note as the server holds it.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<RemoteNote>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    const fn code(&self) -> Option<&'static str> {
        match self {
            Self::AlreadyExists(_) => Some("already_exists"),
            Self::VersionMismatch(_) => Some("version_mismatch"),
            _ => None,
        }
    }
}

impl From<RemoteError> for AppError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::NotFound => Self::NotFound,
            RemoteError::AlreadyExists(current) => Self::AlreadyExists(current),
            RemoteError::VersionMismatch(current) => Self::VersionMismatch(current),
            RemoteError::Rejected(message) => Self::BadRequest(message),
            RemoteError::Transient(message) => Self::Unavailable(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) | Self::VersionMismatch(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let code = self.code();
        let error = self.to_string();
        let current = match self {
            Self::AlreadyExists(current) | Self::VersionMismatch(current) => Some(*current),
            _ => None,
        };
        let body = ErrorBody {
            error,
            code,
            current,
        };
        (status, Json(body)).into_response()
    }
}
