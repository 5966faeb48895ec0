//! Packet engine configuration.

use obex_protocol::{MAX_PACKET_LENGTH, MIN_PACKET_LENGTH};

/// Default local maximum packet length (4 KiB).
pub const DEFAULT_MTU: u16 = 4096;

/// Smallest local maximum packet length the protocol allows.
pub const MIN_MTU: u16 = MIN_PACKET_LENGTH;

/// Largest packet length the length field can express.
pub const MAX_MTU: u16 = MAX_PACKET_LENGTH;

/// Default size of a single transport read (1 KiB).
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Socket configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConfig {
    /// Largest packet this side accepts, advertised in Connect packets.
    pub mtu: u16,
    /// Number of bytes requested from the transport per read.
    pub read_chunk_size: usize,
}

impl SocketConfig {
    pub fn new() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }

    pub fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu.clamp(MIN_MTU, MAX_MTU);
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::new()
    }
}
