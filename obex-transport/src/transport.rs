//! Byte-stream transport contract.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// A reliable, ordered byte stream an OBEX session runs over.
///
/// Reads never block: `Ok(0)` means no data is buffered right now. A
/// transport that has been closed (locally or by the peer) reports
/// `is_open() == false`.
pub trait Transport: Send {
    /// Prepares the transport for use.
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool;

    /// Copies buffered input into `buf`, returning the number of bytes read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes all of `data` or fails.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    fn close(&mut self);
}

/// One direction of an in-memory stream.
#[derive(Debug, Default)]
struct Pipe {
    data: BytesMut,
    closed: bool,
}

/// An in-memory transport.
///
/// Every clone is a handle onto the same pair of pipes, so one handle can
/// be given to a session while another is used to feed input and collect
/// output. [`MemoryTransport::pair`] cross-wires two transports so that
/// what one writes the other reads.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    inbound: Arc<Mutex<Pipe>>,
    outbound: Arc<Mutex<Pipe>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            inbound: Arc::new(Mutex::new(Pipe::default())),
            outbound: Arc::new(Mutex::new(Pipe::default())),
        }
    }

    /// Creates two connected transports.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Mutex::new(Pipe::default()));
        let b_to_a = Arc::new(Mutex::new(Pipe::default()));
        let a = Self {
            inbound: b_to_a.clone(),
            outbound: a_to_b.clone(),
        };
        let b = Self {
            inbound: a_to_b,
            outbound: b_to_a,
        };
        (a, b)
    }

    /// Makes `data` available to the next `read`.
    pub fn push_inbound(&self, data: &[u8]) {
        let mut pipe = self.inbound.lock();
        if !pipe.closed {
            pipe.data.extend_from_slice(data);
        }
    }

    /// Removes and returns everything written so far.
    pub fn take_outbound(&self) -> Bytes {
        self.outbound.lock().data.split().freeze()
    }

    /// Number of written bytes not yet taken.
    pub fn outbound_len(&self) -> usize {
        self.outbound.lock().data.len()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn is_open(&self) -> bool {
        !self.inbound.lock().closed && !self.outbound.lock().closed
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = self.inbound.lock();
        let n = buf.len().min(pipe.data.len());
        buf[..n].copy_from_slice(&pipe.data.split_to(n));
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut pipe = self.outbound.lock();
        if pipe.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "transport is closed",
            ));
        }
        pipe.data.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) {
        self.inbound.lock().closed = true;
        self.outbound.lock().closed = true;
    }
}
