use crate::{routes::path::IndexParseError, services::shard::ShardError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use tracing::error;

pub const INDEX_QUERY_MALFORMED: &str = "INDEX_QUERY_MALFORMED";
pub const NEEDS_BODY: &str = "NEEDS_BODY";
pub const NO_CONTENT_LEN: &str = "NO_CONTENT_LEN";

/// A status plus the plain-text body sent back to the client.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 400 carrying one of the fixed input codes.
    pub fn bad_request(code: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code)
    }

    /// Shortcut for a 500; the description is surfaced to the client.
    pub fn internal(msg: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("ERROR: {}", msg),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl From<IndexParseError> for AppError {
    fn from(_: IndexParseError) -> Self {
        AppError::bad_request(INDEX_QUERY_MALFORMED)
    }
}

impl From<ShardError> for AppError {
    fn from(err: ShardError) -> Self {
        match err {
            ShardError::NeedsBody => AppError::bad_request(NEEDS_BODY),
            ShardError::NoContentLen => AppError::bad_request(NO_CONTENT_LEN),
            other => {
                error!(error = %other, "request failed");
                AppError::internal(other)
            }
        }
    }
}
