//! Queued client commands and their body sources.

use bytes::Bytes;
use obex_protocol::{HeaderSet, Request, SetPathFlags};
use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of a queued command. Ids start at 1; 0 means "none".
pub type CommandId = u64;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> CommandId {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// How a body stream is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// A source of Put data or a destination for Get data.
pub trait BodyStream: Send {
    fn is_open(&self) -> bool;

    fn open(&mut self, mode: OpenMode) -> io::Result<()>;

    /// Reads up to `buf.len()` bytes. Zero means end of data.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Total size, when known.
    fn size(&self) -> Option<u64> {
        None
    }
}

impl BodyStream for File {
    fn is_open(&self) -> bool {
        true
    }

    fn open(&mut self, _mode: OpenMode) -> io::Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)
    }

    fn size(&self) -> Option<u64> {
        self.metadata().ok().map(|m| m.len())
    }
}

/// An in-memory stream whose contents stay reachable through clones.
///
/// Each clone has its own read position and open state but shares the
/// underlying bytes, so a caller can keep one handle while the session
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    pos: usize,
    mode: Option<OpenMode>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data.into())),
            pos: 0,
            mode: None,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BodyStream for SharedBuffer {
    fn is_open(&self) -> bool {
        self.mode.is_some()
    }

    fn open(&mut self, mode: OpenMode) -> io::Result<()> {
        if mode == OpenMode::Write {
            self.data.lock().clear();
        }
        self.pos = 0;
        self.mode = Some(mode);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.mode != Some(OpenMode::Read) {
            return Err(io::Error::new(io::ErrorKind::Other, "not open for reading"));
        }
        let data = self.data.lock();
        let n = buf.len().min(data.len().saturating_sub(self.pos));
        buf[..n].copy_from_slice(&data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.mode != Some(OpenMode::Write) {
            return Err(io::Error::new(io::ErrorKind::Other, "not open for writing"));
        }
        self.data.lock().extend_from_slice(data);
        Ok(())
    }

    fn size(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

/// Body of a command: Put source or Get destination.
pub enum CommandBody {
    Buffer(Bytes),
    Stream(Box<dyn BodyStream>),
}

impl fmt::Debug for CommandBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandBody::Buffer(data) => write!(f, "Buffer({} bytes)", data.len()),
            CommandBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// One queued request.
#[derive(Debug)]
pub struct Command {
    pub(crate) id: CommandId,
    pub(crate) request: Request,
    pub(crate) header: HeaderSet,
    pub(crate) body: Option<CommandBody>,
    pub(crate) flags: SetPathFlags,
}

impl Command {
    pub(crate) fn new(request: Request, header: HeaderSet) -> Self {
        Self {
            id: next_id(),
            request,
            header,
            body: None,
            flags: SetPathFlags::new(),
        }
    }

    pub(crate) fn with_body(mut self, body: CommandBody) -> Self {
        self.body = Some(body);
        self
    }

    pub(crate) fn with_flags(mut self, flags: SetPathFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn request(&self) -> Request {
        self.request
    }

    pub fn header(&self) -> &HeaderSet {
        &self.header
    }

    pub fn set_path_flags(&self) -> SetPathFlags {
        self.flags
    }
}
