//! Object Push service.
//!
//! [`PushService`] is a [`ServerHandler`] that accepts pushed objects into
//! an [`Inbox`] and serves the owner's default business card. It serves
//! Connect, Disconnect, Put and Get; everything else is rejected by the
//! session.

use crate::config::PushConfig;
use crate::error::ServerError;
use crate::handler::{Capabilities, ServerContext, ServerHandler};
use bytes::Bytes;
use obex_protocol::{HeaderSet, Request, ResponseCode, STREAM_CHUNK_SIZE};
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// MIME type of the default business card.
pub const VCARD_MIME_TYPE: &str = "text/x-vCard";

/// File name used when a pushed object has no usable name.
pub const DEFAULT_OBJECT_NAME: &str = "received.obj";

/// Metadata of a pushed object, taken from the Put request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingObject {
    pub name: String,
    pub mime_type: String,
    /// Declared length, 0 when the client did not send one.
    pub length: u32,
    pub description: String,
}

impl IncomingObject {
    pub fn from_header(header: &HeaderSet) -> Self {
        Self {
            name: header.name().unwrap_or_default().to_string(),
            mime_type: header.mime_type().unwrap_or_default(),
            length: header.length().unwrap_or(0),
            description: header.description().unwrap_or_default().to_string(),
        }
    }
}

/// Destination of one accepted object. Dropping a sink without committing
/// it discards whatever was written.
pub trait ObjectSink: Send {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Keeps the object. Returns where it was stored.
    fn commit(self: Box<Self>) -> io::Result<PathBuf>;
}

/// Decides which pushed objects are kept, and where.
pub trait Inbox {
    /// Returns a sink for `object`, or `None` to refuse it.
    fn accept(&mut self, object: &IncomingObject) -> Option<Box<dyn ObjectSink>>;
}

/// Stores pushed objects as files in a directory.
///
/// Objects are written to a temporary file in the directory and renamed
/// once complete, so partial transfers never appear under their real name.
#[derive(Debug, Clone)]
pub struct DirectoryInbox {
    dir: PathBuf,
    max_object_bytes: u64,
}

impl DirectoryInbox {
    pub fn new(dir: impl Into<PathBuf>, max_object_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_object_bytes,
        }
    }

    pub fn from_config(config: &PushConfig) -> Self {
        Self::new(config.inbox_dir.clone(), config.max_object_bytes)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_object_bytes(&self) -> u64 {
        self.max_object_bytes
    }
}

impl Inbox for DirectoryInbox {
    fn accept(&mut self, object: &IncomingObject) -> Option<Box<dyn ObjectSink>> {
        if u64::from(object.length) > self.max_object_bytes {
            tracing::info!(
                "Refusing {:?}: {} bytes exceeds the {} byte limit",
                object.name,
                object.length,
                self.max_object_bytes
            );
            return None;
        }

        let file = std::fs::create_dir_all(&self.dir)
            .and_then(|_| NamedTempFile::new_in(&self.dir));
        match file {
            Ok(file) => Some(Box::new(InboxFile {
                file,
                dir: self.dir.clone(),
                name: sanitize_file_name(&object.name),
                written: 0,
                limit: self.max_object_bytes,
            })),
            Err(e) => {
                tracing::warn!("Cannot create file in {}: {}", self.dir.display(), e);
                None
            }
        }
    }
}

struct InboxFile {
    file: NamedTempFile,
    dir: PathBuf,
    name: String,
    written: u64,
    limit: u64,
}

impl ObjectSink for InboxFile {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let written = self.written + data.len() as u64;
        if written > self.limit {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("object exceeds the {} byte limit", self.limit),
            ));
        }
        self.file.write_all(data)?;
        self.written = written;
        Ok(())
    }

    fn commit(self: Box<Self>) -> io::Result<PathBuf> {
        let InboxFile {
            file, dir, name, ..
        } = *self;
        let path = unique_path(&dir, &name);
        file.as_file().sync_all()?;
        file.persist_noclobber(&path).map_err(|e| e.error)?;
        Ok(path)
    }
}

/// Reduces a client-supplied object name to a plain file name.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    if cleaned.is_empty() {
        DEFAULT_OBJECT_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// `dir/name`, or `dir/stem-N.ext` for the first N not already taken.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if !path.exists() {
        return path;
    }
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    };
    (1u32..)
        .map(|n| dir.join(format!("{}-{}{}", stem, n, ext)))
        .find(|p| !p.exists())
        .unwrap_or(path)
}

/// Service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushServiceState {
    Ready,
    Connecting,
    /// A Put or Get is transferring data.
    Streaming,
    Disconnecting,
    Closed,
}

impl fmt::Display for PushServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PushServiceState::Ready => "ready",
            PushServiceState::Connecting => "connecting",
            PushServiceState::Streaming => "streaming",
            PushServiceState::Disconnecting => "disconnecting",
            PushServiceState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Last error of a [`PushService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushServiceError {
    #[default]
    NoError,
    ConnectionError,
    Aborted,
    UnknownError,
}

/// Something that happened while serving a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushServiceEvent {
    StateChanged(PushServiceState),
    PutRequested(IncomingObject),
    BusinessCardRequested,
    DataTransferProgress { done: u64, total: u64 },
    /// A Put or Get ended. `stored` is where an accepted object was kept.
    RequestFinished { error: bool, stored: Option<PathBuf> },
    /// The client disconnected or the connection was lost.
    Done { error: bool },
}

/// Object Push server handler.
pub struct PushService<I: Inbox> {
    inbox: I,
    business_card: Option<Bytes>,
    state: PushServiceState,
    error: PushServiceError,
    events: VecDeque<PushServiceEvent>,
    sink: Option<Box<dyn ObjectSink>>,
    /// Position in the business card being served.
    card_offset: usize,
    total: u64,
    bytes: u64,
    abort_pending: bool,
}

impl<I: Inbox> PushService<I> {
    pub fn new(inbox: I) -> Self {
        Self {
            inbox,
            business_card: None,
            state: PushServiceState::Ready,
            error: PushServiceError::NoError,
            events: VecDeque::new(),
            sink: None,
            card_offset: 0,
            total: 0,
            bytes: 0,
            abort_pending: false,
        }
    }

    pub fn with_business_card(mut self, vcard: impl Into<Bytes>) -> Self {
        self.set_business_card(vcard);
        self
    }

    /// Sets the vCard served to clients asking for the default business
    /// card. An empty card means none is available.
    pub fn set_business_card(&mut self, vcard: impl Into<Bytes>) {
        let vcard = vcard.into();
        self.business_card = if vcard.is_empty() { None } else { Some(vcard) };
    }

    pub fn business_card(&self) -> Option<&Bytes> {
        self.business_card.as_ref()
    }

    pub fn inbox(&self) -> &I {
        &self.inbox
    }

    pub fn state(&self) -> PushServiceState {
        self.state
    }

    pub fn last_error(&self) -> PushServiceError {
        self.error
    }

    /// Stops the transfer in progress at the next body packet. The client
    /// receives Forbidden.
    pub fn abort(&mut self) {
        if self.state == PushServiceState::Streaming {
            self.abort_pending = true;
        }
    }

    pub fn next_event(&mut self) -> Option<PushServiceEvent> {
        self.events.pop_front()
    }

    pub fn take_events(&mut self) -> Vec<PushServiceEvent> {
        self.events.drain(..).collect()
    }

    fn update_state(&mut self, ctx: &mut ServerContext, state: PushServiceState) {
        if self.state == state {
            return;
        }
        tracing::debug!("Push service {} -> {}", self.state, state);
        self.state = state;
        self.events.push_back(PushServiceEvent::StateChanged(state));

        if state == PushServiceState::Closed {
            self.sink = None;
            ctx.close();
            self.events.push_back(PushServiceEvent::Done {
                error: self.error != PushServiceError::NoError,
            });
        }
    }

    fn take_abort(&mut self) -> bool {
        if self.abort_pending {
            self.error = PushServiceError::Aborted;
            self.abort_pending = false;
            return true;
        }
        false
    }

    fn request_finished(&mut self) {
        let was_streaming = self.state == PushServiceState::Streaming;
        let stored = self.clean_up_put();

        if matches!(
            self.error,
            PushServiceError::NoError | PushServiceError::Aborted
        ) {
            self.state = PushServiceState::Ready;
            self.events
                .push_back(PushServiceEvent::StateChanged(PushServiceState::Ready));
        }

        if was_streaming {
            self.events.push_back(PushServiceEvent::RequestFinished {
                error: self.error != PushServiceError::NoError,
                stored,
            });
        }

        if matches!(
            self.error,
            PushServiceError::ConnectionError | PushServiceError::UnknownError
        ) {
            self.events.push_back(PushServiceEvent::Done { error: true });
        }
    }

    /// Keeps the received object if the transfer succeeded, else drops it.
    fn clean_up_put(&mut self) -> Option<PathBuf> {
        let sink = self.sink.take()?;
        if self.error != PushServiceError::NoError {
            tracing::debug!("Discarding partially received object");
            return None;
        }
        match sink.commit() {
            Ok(path) => {
                tracing::info!("Stored {} bytes in {}", self.bytes, path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Cannot store received object: {}", e);
                self.error = PushServiceError::UnknownError;
                None
            }
        }
    }
}

impl<I: Inbox> ServerHandler for PushService<I> {
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
            .with(Request::Connect)
            .with(Request::Disconnect)
            .with(Request::Put)
            .with(Request::Get)
    }

    fn connect(&mut self, ctx: &mut ServerContext, _header: &HeaderSet) -> ResponseCode {
        self.update_state(ctx, PushServiceState::Connecting);
        ResponseCode::SUCCESS
    }

    fn disconnect(&mut self, ctx: &mut ServerContext, _header: &HeaderSet) -> ResponseCode {
        self.update_state(ctx, PushServiceState::Disconnecting);
        ResponseCode::SUCCESS
    }

    fn put(&mut self, ctx: &mut ServerContext, header: &HeaderSet) -> ResponseCode {
        self.abort_pending = false;
        self.error = PushServiceError::NoError;
        self.sink = None;

        let object = IncomingObject::from_header(header);
        let Some(sink) = self.inbox.accept(&object) else {
            tracing::debug!("Inbox refused {:?}", object.name);
            return ResponseCode::FORBIDDEN;
        };

        tracing::info!(
            "Receiving {:?} ({}, {} bytes)",
            object.name,
            object.mime_type,
            object.length
        );
        self.sink = Some(sink);
        self.total = u64::from(object.length);
        self.bytes = 0;
        self.events.push_back(PushServiceEvent::PutRequested(object));
        self.update_state(ctx, PushServiceState::Streaming);
        ResponseCode::SUCCESS
    }

    fn get(&mut self, ctx: &mut ServerContext, header: &HeaderSet) -> ResponseCode {
        // Only the default business card can be pulled.
        if header.name().is_some_and(|name| !name.is_empty()) {
            return ResponseCode::FORBIDDEN;
        }
        let is_vcard = header
            .mime_type()
            .is_some_and(|t| t.eq_ignore_ascii_case(VCARD_MIME_TYPE));
        if !is_vcard {
            tracing::debug!("Get request was not for a vCard");
            return ResponseCode::FORBIDDEN;
        }

        let Some(card) = &self.business_card else {
            tracing::debug!("Default vCard requested but none is set");
            return ResponseCode::NOT_FOUND;
        };

        self.error = PushServiceError::NoError;
        self.total = card.len() as u64;
        self.bytes = 0;
        self.card_offset = 0;
        self.abort_pending = false;
        self.events.push_back(PushServiceEvent::BusinessCardRequested);
        self.update_state(ctx, PushServiceState::Streaming);
        ResponseCode::SUCCESS
    }

    fn data_available(&mut self, _ctx: &mut ServerContext, data: &[u8]) -> ResponseCode {
        if self.take_abort() {
            return ResponseCode::FORBIDDEN;
        }
        if data.is_empty() {
            return ResponseCode::SUCCESS;
        }

        self.bytes += data.len() as u64;
        let written = match self.sink.as_mut() {
            Some(sink) => sink.write(data),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "no open object")),
        };
        match written {
            Ok(()) => {
                self.events.push_back(PushServiceEvent::DataTransferProgress {
                    done: self.bytes,
                    total: self.total,
                });
                ResponseCode::SUCCESS
            }
            Err(e) => {
                tracing::warn!("Error writing received data: {}", e);
                self.error = PushServiceError::UnknownError;
                ResponseCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn provide_data(&mut self, _ctx: &mut ServerContext) -> (ResponseCode, Bytes) {
        if self.take_abort() {
            return (ResponseCode::FORBIDDEN, Bytes::new());
        }
        let Some(card) = &self.business_card else {
            return (ResponseCode::INTERNAL_SERVER_ERROR, Bytes::new());
        };

        let end = card.len().min(self.card_offset + STREAM_CHUNK_SIZE);
        let chunk = card.slice(self.card_offset.min(end)..end);
        self.card_offset = end;
        if !chunk.is_empty() {
            self.bytes += chunk.len() as u64;
            self.events.push_back(PushServiceEvent::DataTransferProgress {
                done: self.bytes,
                total: self.total,
            });
        }
        (ResponseCode::SUCCESS, chunk)
    }

    fn error(&mut self, ctx: &mut ServerContext, error: &ServerError) {
        tracing::debug!("Push service error during {}: {}", self.state, error);
        if self.state == PushServiceState::Closed {
            return;
        }

        match error {
            ServerError::Aborted(_) => {
                self.error = PushServiceError::Aborted;
                self.request_finished();
            }
            other => {
                self.error = match other {
                    ServerError::ConnectionError(_) => PushServiceError::ConnectionError,
                    _ => PushServiceError::UnknownError,
                };
                if self.state == PushServiceState::Ready {
                    self.events.push_back(PushServiceEvent::Done { error: true });
                } else {
                    self.request_finished();
                }
                if self.error == PushServiceError::ConnectionError {
                    ctx.close();
                }
            }
        }
    }

    fn final_response_sent(&mut self, ctx: &mut ServerContext, request: Request) {
        match request {
            Request::Connect => self.update_state(ctx, PushServiceState::Ready),
            Request::Disconnect => self.update_state(ctx, PushServiceState::Closed),
            Request::Put | Request::Get if self.state == PushServiceState::Streaming => {
                self.request_finished()
            }
            _ => {}
        }
        self.abort_pending = false;
    }
}
