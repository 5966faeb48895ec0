//! Packet framing over a transport.

use crate::config::SocketConfig;
use crate::error::SocketError;
use crate::transport::Transport;
use obex_protocol::{Packet, PacketDecoder, ProtocolError, RawPacket, MIN_PACKET_LENGTH};
use std::io;

/// Result of pulling input from the transport.
#[derive(Debug)]
pub enum ReadStatus {
    /// Input (possibly none) was buffered.
    Ok,
    /// The transport failed.
    Failed(io::Error),
    /// The transport is no longer open. Reported once.
    Closed,
}

/// Frames OBEX packets over a [`Transport`].
///
/// Outgoing packets are limited to the peer's maximum packet length,
/// which stays at the protocol minimum until a Connect exchange
/// negotiates a larger one. Incoming packets are limited to the local
/// maximum from [`SocketConfig`].
pub struct ObexSocket<T: Transport> {
    transport: T,
    config: SocketConfig,
    decoder: PacketDecoder,
    peer_mtu: u16,
    closed_reported: bool,
}

impl<T: Transport> ObexSocket<T> {
    pub fn new(transport: T, config: SocketConfig) -> Self {
        Self {
            transport,
            config,
            decoder: PacketDecoder::with_max_packet_length(config.mtu as usize),
            peer_mtu: MIN_PACKET_LENGTH,
            closed_reported: false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub fn close(&mut self) {
        if self.transport.is_open() {
            tracing::debug!("Closing OBEX transport");
            self.transport.close();
        }
    }

    /// Local maximum packet length.
    pub fn local_mtu(&self) -> u16 {
        self.config.mtu
    }

    /// Maximum length of packets sent to the peer.
    pub fn peer_mtu(&self) -> u16 {
        self.peer_mtu
    }

    pub(crate) fn set_peer_mtu(&mut self, mtu: u16) {
        self.peer_mtu = mtu.max(MIN_PACKET_LENGTH);
        tracing::debug!("Peer maximum packet length is {}", self.peer_mtu);
    }

    pub(crate) fn reset_peer_mtu(&mut self) {
        self.peer_mtu = MIN_PACKET_LENGTH;
    }

    /// Reads everything the transport has buffered into the decoder.
    pub fn read_available(&mut self) -> ReadStatus {
        let mut buf = vec![0u8; self.config.read_chunk_size];
        loop {
            match self.transport.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.decoder.extend(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return ReadStatus::Failed(e),
            }
        }

        if !self.transport.is_open() && !self.closed_reported {
            self.closed_reported = true;
            return ReadStatus::Closed;
        }
        ReadStatus::Ok
    }

    /// Next complete packet in the input buffer, if any.
    pub(crate) fn next_raw(&mut self) -> Result<Option<RawPacket>, ProtocolError> {
        self.decoder.decode_raw()
    }

    /// Drops any partially received input.
    pub(crate) fn discard_input(&mut self) {
        self.decoder.clear();
    }

    /// Encodes and writes a packet.
    pub(crate) fn send(&mut self, packet: &Packet) -> Result<(), SocketError> {
        if !self.transport.is_open() {
            return Err(SocketError::NotOpen);
        }
        let bytes = packet.encode(self.peer_mtu as usize)?;
        tracing::trace!(
            "Sending packet {:#04x} ({} bytes, {} headers)",
            packet.code,
            bytes.len(),
            packet.headers.len()
        );
        self.transport.write(&bytes)?;
        Ok(())
    }
}
