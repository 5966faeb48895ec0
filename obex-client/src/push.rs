//! Object Push client.
//!
//! A thin layer over [`ClientSession`] for the Object Push profile:
//! sending files and business cards, requesting the server's business
//! card, and a reduced error taxonomy.

use crate::command::{BodyStream, CommandId, OpenMode};
use crate::error::ClientErrorKind;
use crate::session::{ClientEvent, ClientSession};
use bytes::Bytes;
use obex_protocol::{HeaderSet, ResponseCode};
use obex_transport::{SocketConfig, Transport};
use std::collections::HashMap;

/// Name used when sending this device's business card.
pub const BUSINESS_CARD_NAME: &str = "BusinessCard.vcf";

/// MIME type of business cards.
pub const VCARD_MIME_TYPE: &str = "text/x-vCard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushCommand {
    Connect,
    Disconnect,
    Send,
    SendBusinessCard,
    RequestBusinessCard,
}

/// Push client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PushError {
    #[default]
    NoError,
    /// The transport failed; the client and server are out of step and
    /// the transport should not be reused.
    ConnectionError,
    RequestFailed,
    Aborted,
    UnknownError,
}

impl From<ClientErrorKind> for PushError {
    fn from(kind: ClientErrorKind) -> Self {
        match kind {
            ClientErrorKind::NoError => PushError::NoError,
            ClientErrorKind::ConnectionError => PushError::ConnectionError,
            ClientErrorKind::RequestFailed => PushError::RequestFailed,
            ClientErrorKind::Aborted => PushError::Aborted,
            _ => PushError::UnknownError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    CommandStarted(CommandId),
    CommandFinished { id: CommandId, error: bool },
    DataTransferProgress { done: u64, total: u64 },
    Done { error: bool },
}

/// Describes an object being sent. Absent fields are left out of the
/// request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub description: Option<String>,
}

impl ObjectInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn to_header(&self) -> HeaderSet {
        let mut header = HeaderSet::new();
        if let Some(name) = &self.name {
            header.set_name(name);
        }
        if let Some(mime_type) = &self.mime_type {
            header.set_mime_type(mime_type);
        }
        if let Some(description) = &self.description {
            header.set_description(description);
        }
        header
    }
}

/// An Object Push client.
pub struct PushClient<T: Transport> {
    session: ClientSession<T>,
    commands: HashMap<CommandId, PushCommand>,
}

impl<T: Transport> PushClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SocketConfig::new())
    }

    pub fn with_config(transport: T, config: SocketConfig) -> Self {
        Self {
            session: ClientSession::with_config(transport, config),
            commands: HashMap::new(),
        }
    }

    pub fn session(&self) -> &ClientSession<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ClientSession<T> {
        &mut self.session
    }

    pub fn connect(&mut self) -> CommandId {
        let id = self.session.connect(HeaderSet::new());
        self.track(id, PushCommand::Connect)
    }

    /// Some push servers drop the transport after a transfer, in which
    /// case this fails with [`PushError::ConnectionError`].
    pub fn disconnect(&mut self) -> CommandId {
        let id = self.session.disconnect(HeaderSet::new());
        self.track(id, PushCommand::Disconnect)
    }

    /// Sends `data`, announcing its length.
    pub fn send(&mut self, data: impl Into<Bytes>, info: &ObjectInfo) -> CommandId {
        let data = data.into();
        let mut header = info.to_header();
        match u32::try_from(data.len()) {
            Ok(len) => header.set_length(len),
            Err(_) => tracing::debug!("Object of {} bytes sent without Length", data.len()),
        }
        let id = self.session.put(header, data);
        self.track(id, PushCommand::Send)
    }

    /// Streams `source`. Its length is announced when it can be opened
    /// and reports a size.
    pub fn send_stream(
        &mut self,
        mut source: Box<dyn BodyStream>,
        info: &ObjectInfo,
    ) -> CommandId {
        let mut header = info.to_header();
        if source.is_open() || source.open(OpenMode::Read).is_ok() {
            if let Some(len) = source.size().and_then(|s| u32::try_from(s).ok()) {
                header.set_length(len);
            }
        }
        let id = self.session.put_stream(header, Some(source));
        self.track(id, PushCommand::Send)
    }

    pub fn send_business_card(&mut self, vcard: Box<dyn BodyStream>) -> CommandId {
        let info = ObjectInfo::new()
            .with_name(BUSINESS_CARD_NAME)
            .with_mime_type(VCARD_MIME_TYPE);
        let id = self.send_stream(vcard, &info);
        self.track(id, PushCommand::SendBusinessCard)
    }

    /// Fetches the server's business card into `vcard`.
    pub fn request_business_card(&mut self, vcard: Box<dyn BodyStream>) -> CommandId {
        let mut header = HeaderSet::new();
        header.set_mime_type(VCARD_MIME_TYPE);
        let id = self.session.get_into(header, vcard);
        self.track(id, PushCommand::RequestBusinessCard)
    }

    /// Sends `mine` then requests the server's card into `theirs`.
    /// Returns the Put and Get ids.
    pub fn exchange_business_card(
        &mut self,
        mine: Box<dyn BodyStream>,
        theirs: Box<dyn BodyStream>,
    ) -> (CommandId, CommandId) {
        let put = self.send_business_card(mine);
        let get = self.request_business_card(theirs);
        (put, get)
    }

    /// Aborts the transfer in progress and drops scheduled commands.
    pub fn abort(&mut self) {
        self.session.abort();
    }

    fn track(&mut self, id: CommandId, command: PushCommand) -> CommandId {
        self.commands.insert(id, command);
        id
    }

    pub fn poll(&mut self) {
        self.session.poll();
    }

    /// Next event, skipping session events the push layer does not
    /// report.
    pub fn next_event(&mut self) -> Option<PushEvent> {
        while let Some(event) = self.session.next_event() {
            let event = match event {
                ClientEvent::RequestStarted(id) => PushEvent::CommandStarted(id),
                ClientEvent::RequestFinished { id, error } => {
                    self.commands.remove(&id);
                    PushEvent::CommandFinished { id, error }
                }
                ClientEvent::DataTransferProgress { done, total } => {
                    PushEvent::DataTransferProgress { done, total }
                }
                ClientEvent::Done { error } => {
                    // Drop commands discarded after a failure; anything
                    // queued since has a newer id.
                    let current = self.session.current_id();
                    self.commands.retain(|id, _| current != 0 && *id >= current);
                    PushEvent::Done { error }
                }
                ClientEvent::ResponseHeaderReceived(_) | ClientEvent::ReadyRead => continue,
            };
            return Some(event);
        }
        None
    }

    pub fn take_events(&mut self) -> Vec<PushEvent> {
        std::iter::from_fn(|| self.next_event()).collect()
    }

    pub fn is_idle(&self) -> bool {
        self.session.is_idle()
    }

    pub fn error(&self) -> PushError {
        self.session.error_kind().into()
    }

    pub fn current_id(&self) -> CommandId {
        self.session.current_id()
    }

    pub fn current_command(&self) -> Option<PushCommand> {
        self.commands.get(&self.session.current_id()).copied()
    }

    pub fn has_pending_commands(&self) -> bool {
        self.session.has_pending_requests()
    }

    pub fn clear_pending_commands(&mut self) {
        let current = self.session.current_id();
        self.session.clear_pending_requests();
        self.commands.retain(|id, _| *id == current);
    }

    pub fn last_command_response(&self) -> ResponseCode {
        self.session.last_response_code()
    }
}
