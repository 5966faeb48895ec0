//! Protocol error types.

use crate::header::HeaderEncoding;
use thiserror::Error;

/// Protocol-level errors that can occur while marshalling headers,
/// framing packets or handling authentication fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("header {id:#04x} expects a {expected} value")]
    HeaderTypeMismatch { id: u8, expected: HeaderEncoding },

    #[error("header {id:#04x} value is too large: {size} bytes")]
    HeaderTooLarge { id: u8, size: usize },

    #[error("header {id:#04x} is truncated")]
    TruncatedHeader { id: u8 },

    #[error("header {id:#04x} declares invalid length {length}")]
    InvalidHeaderLength { id: u8, length: u16 },

    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge { size: usize, max: usize },

    #[error("invalid packet length field: {0}")]
    InvalidPacketLength(u16),

    #[error("packet {code:#04x} is missing its {expected}-byte prefix")]
    MissingPrefix { code: u8, expected: usize },

    #[error("authentication challenge has no nonce")]
    MissingNonce,

    #[error("invalid nonce length: {0} bytes (expected 16)")]
    InvalidNonceLength(usize),

    #[error("authentication response has no digest")]
    MissingDigest,

    #[error("invalid digest length: {0} bytes (expected 16)")]
    InvalidDigestLength(usize),

    #[error("authentication field {tag:#04x} overruns the buffer")]
    TruncatedAuthField { tag: u8 },

    #[error("user id too long: {0} bytes (max 20)")]
    UserIdTooLong(usize),

    #[error("realm too long: {0} bytes")]
    RealmTooLong(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::HeaderTypeMismatch {
            id: 0x01,
            expected: HeaderEncoding::Unicode,
        };
        assert_eq!(err.to_string(), "header 0x01 expects a unicode value");

        let err = ProtocolError::PacketTooLarge { size: 300, max: 255 };
        assert_eq!(err.to_string(), "packet too large: 300 bytes (max 255)");

        let err = ProtocolError::UserIdTooLong(21);
        assert!(err.to_string().contains("21"));
    }
}
