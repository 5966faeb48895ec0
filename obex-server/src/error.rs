//! Server error types.

use std::fmt;
use thiserror::Error;

/// Errors reported to a [`crate::ServerHandler`] through its `error` hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    /// The transport was lost or could not be written.
    #[error("{0}")]
    ConnectionError(String),

    /// The client sent a malformed request.
    #[error("{0}")]
    InvalidRequest(String),

    /// The client aborted the request in progress.
    #[error("{0}")]
    Aborted(String),

    #[error("{0}")]
    AuthenticationFailed(String),

    #[error("{0}")]
    UnknownError(String),
}

/// Error category without the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerErrorKind {
    ConnectionError,
    InvalidRequest,
    Aborted,
    AuthenticationFailed,
    UnknownError,
}

impl ServerError {
    pub fn kind(&self) -> ServerErrorKind {
        match self {
            ServerError::ConnectionError(_) => ServerErrorKind::ConnectionError,
            ServerError::InvalidRequest(_) => ServerErrorKind::InvalidRequest,
            ServerError::Aborted(_) => ServerErrorKind::Aborted,
            ServerError::AuthenticationFailed(_) => ServerErrorKind::AuthenticationFailed,
            ServerError::UnknownError(_) => ServerErrorKind::UnknownError,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ServerError::ConnectionError(msg)
            | ServerError::InvalidRequest(msg)
            | ServerError::Aborted(msg)
            | ServerError::AuthenticationFailed(msg)
            | ServerError::UnknownError(msg) => msg,
        }
    }
}

impl fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerErrorKind::ConnectionError => "connection error",
            ServerErrorKind::InvalidRequest => "invalid request",
            ServerErrorKind::Aborted => "aborted",
            ServerErrorKind::AuthenticationFailed => "authentication failed",
            ServerErrorKind::UnknownError => "unknown error",
        };
        f.write_str(name)
    }
}
