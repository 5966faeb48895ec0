//! Client error types.

use std::fmt;
use thiserror::Error;

/// Why a client operation failed. Every variant carries the
/// human-readable text reported by [`crate::ClientSession::error_string`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The transport is not open or was lost.
    #[error("{0}")]
    ConnectionError(String),

    /// The server answered with a non-success response.
    #[error("{0}")]
    RequestFailed(String),

    #[error("{0}")]
    InvalidRequest(String),

    /// The server sent data that could not be parsed.
    #[error("{0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Aborted(String),

    #[error("{0}")]
    AuthenticationFailed(String),

    #[error("{0}")]
    UnknownError(String),
}

/// Error category without the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClientErrorKind {
    #[default]
    NoError,
    ConnectionError,
    RequestFailed,
    InvalidRequest,
    InvalidResponse,
    Aborted,
    AuthenticationFailed,
    UnknownError,
}

impl ClientError {
    pub fn kind(&self) -> ClientErrorKind {
        match self {
            ClientError::ConnectionError(_) => ClientErrorKind::ConnectionError,
            ClientError::RequestFailed(_) => ClientErrorKind::RequestFailed,
            ClientError::InvalidRequest(_) => ClientErrorKind::InvalidRequest,
            ClientError::InvalidResponse(_) => ClientErrorKind::InvalidResponse,
            ClientError::Aborted(_) => ClientErrorKind::Aborted,
            ClientError::AuthenticationFailed(_) => ClientErrorKind::AuthenticationFailed,
            ClientError::UnknownError(_) => ClientErrorKind::UnknownError,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ClientError::ConnectionError(msg)
            | ClientError::RequestFailed(msg)
            | ClientError::InvalidRequest(msg)
            | ClientError::InvalidResponse(msg)
            | ClientError::Aborted(msg)
            | ClientError::AuthenticationFailed(msg)
            | ClientError::UnknownError(msg) => msg,
        }
    }

    /// Returns whether the same request may succeed if issued again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::ConnectionError(_) => true,
            ClientError::Aborted(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientErrorKind::NoError => "no error",
            ClientErrorKind::ConnectionError => "connection error",
            ClientErrorKind::RequestFailed => "request failed",
            ClientErrorKind::InvalidRequest => "invalid request",
            ClientErrorKind::InvalidResponse => "invalid response",
            ClientErrorKind::Aborted => "aborted",
            ClientErrorKind::AuthenticationFailed => "authentication failed",
            ClientErrorKind::UnknownError => "unknown error",
        };
        f.write_str(name)
    }
}
