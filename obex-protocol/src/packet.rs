//! Binary packet format.
//!
//! Packet layout (3 bytes header + optional prefix + headers):
//!
//! ```text
//! +--------+-----------+----------------------+---------------------+
//! | code   | length    | prefix               | headers             |
//! | 1 byte | 2 bytes   | 0, 2 or 4 bytes      | length - 3 - prefix |
//! +--------+-----------+----------------------+---------------------+
//! ```
//!
//! The length is big-endian and covers the whole packet. Connect packets
//! (both directions) carry a 4-byte prefix, SetPath requests a 2-byte one.

use crate::error::ProtocolError;
use crate::header::RawHeader;
use crate::request::opcode;
use crate::{MIN_PACKET_LENGTH, OBEX_VERSION};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the fixed packet header in bytes (1 + 2).
pub const PACKET_HEADER_SIZE: usize = 3;

/// Size of the Connect prefix.
pub const CONNECT_PREFIX_SIZE: usize = 4;

/// The non-header data of a Connect request or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParams {
    pub version: u8,
    pub flags: u8,
    pub max_packet_length: u16,
}

impl ConnectParams {
    pub fn new(max_packet_length: u16) -> Self {
        Self {
            version: OBEX_VERSION,
            flags: 0,
            max_packet_length,
        }
    }

    pub fn encode(&self) -> [u8; CONNECT_PREFIX_SIZE] {
        let len = self.max_packet_length.to_be_bytes();
        [self.version, self.flags, len[0], len[1]]
    }

    pub fn decode(prefix: &[u8]) -> Option<Self> {
        if prefix.len() < CONNECT_PREFIX_SIZE {
            return None;
        }
        Some(Self {
            version: prefix[0],
            flags: prefix[1],
            max_packet_length: u16::from_be_bytes([prefix[2], prefix[3]]),
        })
    }

    /// The peer's packet limit, raised to the protocol minimum.
    pub fn effective_max_packet_length(&self) -> u16 {
        self.max_packet_length.max(MIN_PACKET_LENGTH)
    }
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self::new(MIN_PACKET_LENGTH)
    }
}

/// A complete packet whose body has not been interpreted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub code: u8,
    /// Everything after the 3-byte packet header.
    pub payload: Bytes,
}

impl RawPacket {
    /// Decodes a raw packet from `buf`.
    ///
    /// Returns `Ok(Some(packet))` if a complete packet was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    pub fn decode(buf: &mut BytesMut, max_len: usize) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        let code = buf[0];
        let length = u16::from_be_bytes([buf[1], buf[2]]);
        if (length as usize) < PACKET_HEADER_SIZE {
            return Err(ProtocolError::InvalidPacketLength(length));
        }
        let length = length as usize;
        if length > max_len {
            return Err(ProtocolError::PacketTooLarge {
                size: length,
                max: max_len,
            });
        }
        if buf.len() < length {
            return Ok(None);
        }

        buf.advance(PACKET_HEADER_SIZE);
        let payload = buf.split_to(length - PACKET_HEADER_SIZE).freeze();
        Ok(Some(Self { code, payload }))
    }

    /// Splits the payload into its prefix and headers.
    pub fn into_packet(self, prefix_len: usize) -> Result<Packet, ProtocolError> {
        if self.payload.len() < prefix_len {
            return Err(ProtocolError::MissingPrefix {
                code: self.code,
                expected: prefix_len,
            });
        }
        let prefix = self.payload.slice(..prefix_len);
        let headers = RawHeader::decode_all(&self.payload[prefix_len..])?;
        Ok(Packet {
            code: self.code,
            prefix,
            headers,
        })
    }

    /// Interprets this packet as a request, using the prefix length
    /// implied by its opcode.
    pub fn into_request(self) -> Result<Packet, ProtocolError> {
        let prefix_len = opcode::request_prefix_len(self.code);
        self.into_packet(prefix_len)
    }
}

/// A request or response packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub code: u8,
    /// Non-header data (Connect parameters, SetPath flags).
    pub prefix: Bytes,
    pub headers: Vec<RawHeader>,
}

impl Packet {
    pub fn new(code: u8) -> Self {
        Self {
            code,
            prefix: Bytes::new(),
            headers: Vec::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<Bytes>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_headers(mut self, headers: Vec<RawHeader>) -> Self {
        self.headers = headers;
        self
    }

    /// Whether the final bit is set.
    pub fn is_final(&self) -> bool {
        self.code & opcode::FINAL_BIT != 0
    }

    /// Whether any header carries body data.
    pub fn has_body(&self) -> bool {
        self.headers.iter().any(RawHeader::is_body)
    }

    /// Connect parameters carried in the prefix, if it has one.
    pub fn connect_params(&self) -> Option<ConnectParams> {
        ConnectParams::decode(&self.prefix)
    }

    /// Size of this packet on the wire.
    pub fn encoded_len(&self) -> usize {
        PACKET_HEADER_SIZE
            + self.prefix.len()
            + self.headers.iter().map(RawHeader::encoded_len).sum::<usize>()
    }

    /// Encodes the packet, failing if it would exceed `max_len` bytes.
    pub fn encode(&self, max_len: usize) -> Result<BytesMut, ProtocolError> {
        let total = self.encoded_len();
        if total > max_len || total > u16::MAX as usize {
            return Err(ProtocolError::PacketTooLarge {
                size: total,
                max: max_len.min(u16::MAX as usize),
            });
        }

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(self.code);
        buf.put_u16(total as u16);
        buf.put_slice(&self.prefix);
        for header in &self.headers {
            header.encode(&mut buf)?;
        }
        Ok(buf)
    }
}
