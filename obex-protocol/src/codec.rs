//! Streaming decoder for OBEX packets.

use crate::error::ProtocolError;
use crate::packet::{Packet, RawPacket};
use crate::MAX_PACKET_LENGTH;
use bytes::BytesMut;

/// Accumulates bytes read from a transport and splits them into packets.
pub struct PacketDecoder {
    buffer: BytesMut,
    max_packet_length: usize,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::with_max_packet_length(MAX_PACKET_LENGTH as usize)
    }

    /// Creates a decoder that rejects packets longer than `max` bytes.
    pub fn with_max_packet_length(max: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max.min(8192)),
            max_packet_length: max,
        }
    }

    pub fn max_packet_length(&self) -> usize {
        self.max_packet_length
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next packet from the buffer.
    pub fn decode_raw(&mut self) -> Result<Option<RawPacket>, ProtocolError> {
        RawPacket::decode(&mut self.buffer, self.max_packet_length)
    }

    /// Attempts to decode the next request packet.
    pub fn decode_request(&mut self) -> Result<Option<Packet>, ProtocolError> {
        match self.decode_raw()? {
            Some(raw) => raw.into_request().map(Some),
            None => Ok(None),
        }
    }

    /// Attempts to decode the next response packet. A response carries a
    /// prefix only when it answers a Connect, so the caller supplies the
    /// expected prefix length.
    pub fn decode_response(&mut self, prefix_len: usize) -> Result<Option<Packet>, ProtocolError> {
        match self.decode_raw()? {
            Some(raw) => raw.into_packet(prefix_len).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}
