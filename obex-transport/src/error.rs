//! Packet engine errors.

use obex_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("transport is not open")]
    NotOpen,

    #[error("a request is already in progress")]
    Busy,

    #[error("request does not fit in a {max}-byte packet ({size} bytes)")]
    RequestTooLarge { size: usize, max: usize },

    #[error("body source failed")]
    BodySource,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
