//! # obex-protocol
//!
//! Wire protocol implementation for OBEX (IrOBEX object exchange).
//!
//! This crate provides:
//! - The typed header container and its tag-length-value marshalling
//! - Request opcodes, response codes and SetPath flags
//! - Binary packet framing with a streaming decoder
//! - The MD5 digest challenge/response authentication sub-protocol
//! - Error types and protocol constants

pub mod auth;
pub mod codec;
pub mod error;
pub mod header;
pub mod packet;
pub mod request;
pub mod time;

pub use auth::{AuthChallenge, AuthChallengeOptions, AuthResponse};
pub use codec::PacketDecoder;
pub use error::ProtocolError;
pub use header::{header_id, HeaderEncoding, HeaderSet, HeaderValue, RawHeader};
pub use packet::{ConnectParams, Packet, RawPacket, CONNECT_PREFIX_SIZE, PACKET_HEADER_SIZE};
pub use request::{opcode, Request, ResponseCode, SetPathFlags};
pub use time::HeaderTime;

/// OBEX protocol version advertised in Connect packets (1.0).
pub const OBEX_VERSION: u8 = 0x10;

/// Smallest maximum packet length a peer may advertise.
pub const MIN_PACKET_LENGTH: u16 = 255;

/// Largest packet length representable by the 2-byte length field.
pub const MAX_PACKET_LENGTH: u16 = u16::MAX;

/// Chunk size used when streaming object bodies.
pub const STREAM_CHUNK_SIZE: usize = 4096;
