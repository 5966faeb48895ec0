//! Client session.
//!
//! A [`ClientSession`] queues requests and runs them one at a time over a
//! [`ClientSocket`]. It never blocks: the owner calls
//! [`ClientSession::poll`] whenever the transport may have input and then
//! drains the [`ClientEvent`]s it produced.
//!
//! Work triggered from inside a packet engine callback (starting the next
//! command, resending a request with an authentication response) is put
//! on a [`TaskQueue`] and runs after the callback has returned.

use crate::command::{BodyStream, Command, CommandBody, CommandId, OpenMode};
use crate::error::{ClientError, ClientErrorKind};
use bytes::{Buf, Bytes, BytesMut};
use obex_protocol::{
    header_id, AuthChallenge, AuthResponse, HeaderSet, Request, ResponseCode, SetPathFlags,
    STREAM_CHUNK_SIZE,
};
use obex_transport::{BodyChunk, ClientSink, ClientSocket, SocketConfig, TaskQueue, Transport};
use std::collections::VecDeque;

/// Notifications produced by a [`ClientSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    RequestStarted(CommandId),
    /// Emitted exactly once per started command.
    RequestFinished {
        id: CommandId,
        error: bool,
    },
    ResponseHeaderReceived(HeaderSet),
    DataTransferProgress {
        done: u64,
        total: u64,
    },
    /// Get data was appended to the internal buffer.
    ReadyRead,
    /// The queue ran empty.
    Done {
        error: bool,
    },
}

/// Answers authentication exchanges for a [`ClientSession`].
pub trait ClientAuthenticator: Send {
    /// The server challenged the current request. Setting a user or a
    /// password on `challenge` answers it; leaving both untouched fails
    /// the request.
    fn authentication_required(&mut self, challenge: &mut AuthChallenge);

    /// The server answered a challenge this client sent. Returning false
    /// fails the request.
    fn authentication_response(&mut self, response: &AuthResponse) -> bool;
}

/// Fixed user and password.
///
/// Challenges are answered with both; server responses are accepted when
/// their digest matches the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl ClientAuthenticator for Credentials {
    fn authentication_required(&mut self, challenge: &mut AuthChallenge) {
        if !self.user.is_empty() {
            challenge.set_user(self.user.clone());
        }
        challenge.set_password(self.password.clone());
    }

    fn authentication_response(&mut self, response: &AuthResponse) -> bool {
        response.matches(&self.password)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    DoPending,
    ResendWithAuthResponse,
}

/// Per-session state. Kept apart from the socket so it can be handed to
/// the packet engine as its sink.
struct SessionState {
    queue: VecDeque<Command>,
    tasks: TaskQueue<Task>,
    events: VecDeque<ClientEvent>,
    authenticator: Option<Box<dyn ClientAuthenticator>>,
    busy: bool,
    aborting: bool,
    disconnected: bool,
    error: Option<ClientError>,
    last_response_code: ResponseCode,
    last_response_header: HeaderSet,
    connection_id: Option<u32>,
    challenge_nonce: Bytes,
    next_auth_response: Bytes,
    sent_auth_response: bool,
    received_auth_response: bool,
    total_bytes: u64,
    current_bytes: u64,
    reported_bytes: u64,
    source_offset: usize,
    received: BytesMut,
}

impl SessionState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            tasks: TaskQueue::new(),
            events: VecDeque::new(),
            authenticator: None,
            busy: false,
            aborting: false,
            disconnected: false,
            error: None,
            last_response_code: ResponseCode::SUCCESS,
            last_response_header: HeaderSet::new(),
            connection_id: None,
            challenge_nonce: Bytes::new(),
            next_auth_response: Bytes::new(),
            sent_auth_response: false,
            received_auth_response: false,
            total_bytes: 0,
            current_bytes: 0,
            reported_bytes: 0,
            source_offset: 0,
            received: BytesMut::new(),
        }
    }

    fn current_request(&self) -> Option<Request> {
        self.queue.front().map(|c| c.request)
    }

    fn reset_operation(&mut self) {
        self.error = None;
        self.last_response_code = ResponseCode::SUCCESS;
        self.last_response_header.clear();
        self.challenge_nonce = Bytes::new();
        self.next_auth_response = Bytes::new();
        self.sent_auth_response = false;
        self.received_auth_response = false;
    }

    fn prepare_put(&mut self) -> Result<(), ClientError> {
        let Some(cmd) = self.queue.front_mut() else {
            return Ok(());
        };
        let length = cmd.header.length();
        let size = match cmd.body.as_mut() {
            None => {
                return Err(ClientError::InvalidRequest(
                    "No source data provided".into(),
                ))
            }
            Some(CommandBody::Buffer(data)) => data.len() as u64,
            Some(CommandBody::Stream(stream)) => {
                if !stream.is_open() {
                    stream.open(OpenMode::Read).map_err(|e| {
                        tracing::warn!("Cannot open Put source: {}", e);
                        ClientError::UnknownError("Cannot open source I/O device".into())
                    })?;
                }
                stream.size().unwrap_or(0)
            }
        };

        self.total_bytes = length.map(u64::from).unwrap_or(size);
        self.current_bytes = 0;
        self.reported_bytes = 0;
        self.source_offset = 0;
        Ok(())
    }

    fn prepare_get(&mut self) -> Result<(), ClientError> {
        if let Some(CommandBody::Stream(stream)) =
            self.queue.front_mut().and_then(|c| c.body.as_mut())
        {
            if !stream.is_open() {
                stream.open(OpenMode::Write).map_err(|e| {
                    tracing::warn!("Cannot open Get destination: {}", e);
                    ClientError::UnknownError("Cannot open I/O device for received data".into())
                })?;
            }
        } else {
            self.received.clear();
        }

        self.total_bytes = 0;
        self.current_bytes = 0;
        self.reported_bytes = 0;
        Ok(())
    }

    fn report_progress(&mut self) {
        self.reported_bytes = self.current_bytes;
        self.events.push_back(ClientEvent::DataTransferProgress {
            done: self.current_bytes,
            total: self.total_bytes,
        });
    }

    fn read_authentication_challenge(&mut self, data: &[u8]) {
        let mut challenge = match AuthChallenge::parse(data) {
            Ok(challenge) => challenge,
            Err(e) => {
                tracing::warn!("Unreadable server authentication challenge: {}", e);
                self.error = Some(ClientError::AuthenticationFailed(
                    "Invalid server authentication challenge".into(),
                ));
                return;
            }
        };

        if let Some(authenticator) = self.authenticator.as_mut() {
            authenticator.authentication_required(&mut challenge);
        }
        if !challenge.is_modified() {
            self.error = Some(ClientError::AuthenticationFailed(
                "Client did not provide username or password for authentication".into(),
            ));
            return;
        }

        match challenge.to_response(&[]) {
            Ok(response) => self.next_auth_response = response,
            Err(e) => {
                tracing::warn!("Cannot answer authentication challenge: {}", e);
                self.error = Some(ClientError::AuthenticationFailed(
                    "Error responding to authentication challenge".into(),
                ));
            }
        }
    }

    /// Returns false if the response was rejected.
    fn read_authentication_response(&mut self, data: &[u8]) -> bool {
        let response = match AuthResponse::parse(data, self.challenge_nonce.clone()) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Unreadable server authentication response: {}", e);
                self.error = Some(ClientError::AuthenticationFailed(
                    "Invalid server authentication response".into(),
                ));
                return false;
            }
        };

        let accepted = self
            .authenticator
            .as_mut()
            .is_some_and(|a| a.authentication_response(&response));
        if !accepted {
            self.error = Some(ClientError::AuthenticationFailed(
                "Authentication failed".into(),
            ));
        }
        accepted
    }

    fn finished_all(&mut self) {
        let error = self.error.is_some();
        tracing::debug!("All requests finished (error: {})", error);
        self.events.push_back(ClientEvent::Done { error });
    }

    fn finish_current(&mut self, result: Option<ClientError>) {
        let Some(head) = self.queue.front() else {
            return;
        };
        let (id, request) = (head.id, head.request);
        match &result {
            Some(err) => tracing::debug!("Request {} ({}) failed: {}", id, request, err),
            None => tracing::debug!("Request {} ({}) finished", id, request),
        }

        let failed = result.is_some();
        self.error = result;
        self.aborting = false;
        if request == Request::Disconnect {
            self.connection_id = None;
        }

        self.events
            .push_back(ClientEvent::RequestFinished { id, error: failed });
        self.queue.pop_front();
        self.busy = false;
        if failed {
            self.queue.clear();
        }

        self.tasks.invalidate();
        self.tasks.schedule(Task::DoPending);
    }

    fn finished_abort(&mut self, sent: bool) {
        let err = if sent {
            ClientError::Aborted("Request aborted".into())
        } else {
            ClientError::ConnectionError("Error aborting request".into())
        };
        self.finish_current(Some(err));
    }

    fn error_occurred(&mut self, err: ClientError) {
        if !self.busy {
            tracing::debug!("Ignoring error with no request in progress: {}", err);
            return;
        }
        if self.aborting && err.kind() == ClientErrorKind::ConnectionError {
            self.finished_abort(false);
        } else {
            self.finish_current(Some(err));
        }
    }
}

impl ClientSink for SessionState {
    fn request_progressed(&mut self) {
        if self.current_request() == Some(Request::Put) && self.current_bytes != self.reported_bytes
        {
            self.report_progress();
        }
    }

    fn response_headers_received(&mut self, mut headers: HeaderSet) {
        match self.current_request() {
            Some(Request::Connect) => {
                if let Some(id) = headers.connection_id() {
                    self.connection_id = Some(id);
                }
            }
            Some(Request::Get) if self.total_bytes == 0 => {
                if let Some(length) = headers.length() {
                    self.total_bytes = u64::from(length);
                }
            }
            _ => {}
        }

        if let Some(challenge) = headers
            .get(header_id::AUTH_CHALLENGE)
            .and_then(|v| v.as_bytes())
            .cloned()
        {
            self.read_authentication_challenge(&challenge);
            return;
        }

        if let Some(response) = headers
            .get(header_id::AUTH_RESPONSE)
            .and_then(|v| v.as_bytes())
            .cloned()
        {
            self.received_auth_response = true;
            if !self.read_authentication_response(&response) {
                return;
            }
            headers.remove(header_id::AUTH_RESPONSE);
        }

        self.last_response_header = headers.clone();
        self.events
            .push_back(ClientEvent::ResponseHeaderReceived(headers));
    }

    fn request_done(&mut self, code: ResponseCode) {
        if let Some(err) = self.error.clone() {
            self.finish_current(Some(err));
            return;
        }

        if code == ResponseCode::SUCCESS
            && !self.challenge_nonce.is_empty()
            && !self.received_auth_response
        {
            self.finish_current(Some(ClientError::AuthenticationFailed(
                "Did not receive authentication response".into(),
            )));
            return;
        }

        if code != ResponseCode::SUCCESS && !self.next_auth_response.is_empty() {
            tracing::debug!("Server answered {}; resending with authentication", code);
            self.tasks.schedule(Task::ResendWithAuthResponse);
            return;
        }

        self.last_response_code = code;
        let result = if code == ResponseCode::SUCCESS {
            None
        } else if code == ResponseCode::UNAUTHORIZED && self.sent_auth_response {
            Some(ClientError::AuthenticationFailed(
                "Authentication failed".into(),
            ))
        } else {
            Some(ClientError::RequestFailed("Request failed".into()))
        };
        self.finish_current(result);
    }

    fn request_aborted(&mut self) {
        self.finished_abort(true);
    }

    fn body_data_required(&mut self) -> BodyChunk {
        let chunk = match self.queue.front_mut().and_then(|c| c.body.as_mut()) {
            Some(CommandBody::Buffer(data)) => {
                let start = self.source_offset.min(data.len());
                let end = (start + STREAM_CHUNK_SIZE).min(data.len());
                self.source_offset = end;
                Ok(data.slice(start..end))
            }
            Some(CommandBody::Stream(stream)) => {
                let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
                stream.read(&mut buf).map(|n| {
                    buf.truncate(n);
                    Bytes::from(buf)
                })
            }
            None => Ok(Bytes::new()),
        };

        match chunk {
            Ok(data) if data.is_empty() => {
                // Single-packet transfers never see a Continue.
                if self.current_bytes != self.reported_bytes {
                    self.report_progress();
                }
                BodyChunk::End
            }
            Ok(data) => {
                self.current_bytes += data.len() as u64;
                BodyChunk::Data(data)
            }
            Err(e) => {
                tracing::warn!("Reading Put source failed: {}", e);
                BodyChunk::Error
            }
        }
    }

    fn body_data_available(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }

        match self.queue.front_mut().and_then(|c| c.body.as_mut()) {
            Some(CommandBody::Stream(stream)) => {
                if let Err(e) = stream.write(data) {
                    tracing::warn!("Writing received data failed: {}", e);
                    return;
                }
            }
            _ => {
                self.received.extend_from_slice(data);
                self.events.push_back(ClientEvent::ReadyRead);
            }
        }

        self.current_bytes += data.len() as u64;
        self.report_progress();
    }

    fn link_error(&mut self) {
        self.error_occurred(ClientError::ConnectionError("Connection error".into()));
    }

    fn parse_error(&mut self) {
        self.error_occurred(ClientError::InvalidResponse(
            "Invalid server response".into(),
        ));
    }

    fn unknown_error(&mut self) {
        self.error_occurred(ClientError::UnknownError("Unknown error".into()));
    }

    fn disconnected(&mut self) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;
        tracing::debug!("Server disconnected");

        if self.busy {
            self.finish_current(Some(ClientError::ConnectionError(
                "Connection error".into(),
            )));
        }
    }
}

/// An OBEX client session over a transport.
///
/// Requests are queued by the `connect`, `put`, `get` (and so on)
/// methods, each returning the command's id, and run in order. A failed
/// request discards everything queued behind it.
pub struct ClientSession<T: Transport> {
    socket: ClientSocket<T>,
    state: SessionState,
}

impl<T: Transport> ClientSession<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SocketConfig::new())
    }

    pub fn with_config(transport: T, config: SocketConfig) -> Self {
        Self {
            socket: ClientSocket::new(transport, config),
            state: SessionState::new(),
        }
    }

    pub fn set_authenticator(&mut self, authenticator: impl ClientAuthenticator + 'static) {
        self.state.authenticator = Some(Box::new(authenticator));
    }

    pub fn socket(&self) -> &ClientSocket<T> {
        &self.socket
    }

    pub fn transport(&self) -> &T {
        self.socket.socket().transport()
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_open()
    }

    /// Closes the transport. A request in progress fails with a
    /// connection error on the next [`poll`](Self::poll).
    pub fn close(&mut self) {
        self.socket.close();
    }

    // =========================================================================
    // Requests
    // =========================================================================

    pub fn connect(&mut self, header: HeaderSet) -> CommandId {
        self.enqueue(Command::new(Request::Connect, header))
    }

    pub fn disconnect(&mut self, header: HeaderSet) -> CommandId {
        self.enqueue(Command::new(Request::Disconnect, header))
    }

    /// Sends `data` as the object body.
    pub fn put(&mut self, header: HeaderSet, data: impl Into<Bytes>) -> CommandId {
        let cmd = Command::new(Request::Put, header).with_body(CommandBody::Buffer(data.into()));
        self.enqueue(cmd)
    }

    /// Streams the object body from `source`, opening it for reading if
    /// needed. Without a source the request fails with
    /// [`ClientError::InvalidRequest`].
    pub fn put_stream(
        &mut self,
        header: HeaderSet,
        source: Option<Box<dyn BodyStream>>,
    ) -> CommandId {
        let mut cmd = Command::new(Request::Put, header);
        if let Some(source) = source {
            cmd = cmd.with_body(CommandBody::Stream(source));
        }
        self.enqueue(cmd)
    }

    pub fn put_delete(&mut self, header: HeaderSet) -> CommandId {
        self.enqueue(Command::new(Request::PutDelete, header))
    }

    /// Fetches an object into the session's buffer; see
    /// [`read`](Self::read).
    pub fn get(&mut self, header: HeaderSet) -> CommandId {
        self.enqueue(Command::new(Request::Get, header))
    }

    /// Fetches an object into `destination`, opening it for writing if
    /// needed.
    pub fn get_into(&mut self, header: HeaderSet, destination: Box<dyn BodyStream>) -> CommandId {
        let cmd = Command::new(Request::Get, header).with_body(CommandBody::Stream(destination));
        self.enqueue(cmd)
    }

    pub fn set_path(&mut self, header: HeaderSet, flags: SetPathFlags) -> CommandId {
        self.enqueue(Command::new(Request::SetPath, header).with_flags(flags))
    }

    fn enqueue(&mut self, cmd: Command) -> CommandId {
        let id = cmd.id;
        tracing::debug!("Queued request {} ({})", id, cmd.request);
        self.state.queue.push_back(cmd);
        if self.state.queue.len() == 1 {
            self.state.tasks.schedule(Task::DoPending);
        }
        id
    }

    /// Aborts the current request at the next packet boundary. The
    /// request then finishes with [`ClientError::Aborted`] and all queued
    /// requests are discarded.
    pub fn abort(&mut self) {
        if self.state.queue.is_empty() || self.state.aborting {
            return;
        }
        self.state.aborting = true;
        if !self.socket.abort_current_request() {
            tracing::debug!("Abort deferred until the current request starts");
        }
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    /// Handles any input from the transport, then runs deferred work.
    pub fn poll(&mut self) {
        self.socket.process_input(&mut self.state);

        for scheduled in self.state.tasks.take_ready() {
            if !self.state.tasks.is_live(&scheduled) {
                continue;
            }
            match scheduled.task {
                Task::DoPending => self.do_pending(),
                Task::ResendWithAuthResponse => self.resend_with_auth_response(),
            }
        }
    }

    /// Whether nothing is queued and no deferred work remains.
    pub fn is_idle(&self) -> bool {
        self.state.queue.is_empty() && self.state.tasks.is_empty()
    }

    pub fn next_event(&mut self) -> Option<ClientEvent> {
        self.state.events.pop_front()
    }

    pub fn take_events(&mut self) -> Vec<ClientEvent> {
        self.state.events.drain(..).collect()
    }

    fn do_pending(&mut self) {
        let Some(id) = self.state.queue.front().map(|c| c.id) else {
            self.state.finished_all();
            return;
        };
        if self.state.busy {
            return;
        }

        self.state.busy = true;
        self.state.reset_operation();
        tracing::debug!("Starting request {}", id);
        self.state.events.push_back(ClientEvent::RequestStarted(id));
        self.perform_command();
    }

    fn perform_command(&mut self) {
        let state = &mut self.state;
        if state.aborting {
            state.finished_abort(true);
            return;
        }
        if !self.socket.is_open() {
            state.finish_current(Some(ClientError::ConnectionError(
                "Not connected to server".into(),
            )));
            return;
        }

        let connection_id = state.connection_id;
        let Some(cmd) = state.queue.front_mut() else {
            return;
        };
        if cmd.request != Request::Connect && !cmd.header.contains(header_id::TARGET) {
            if let Some(id) = connection_id {
                cmd.header.set_connection_id(id);
            }
        }
        let nonce = cmd
            .header
            .contains(header_id::AUTH_CHALLENGE)
            .then(|| cmd.header.challenge_nonce().clone());
        let request = cmd.request;
        let flags = cmd.flags;
        let headers = cmd.header.write_headers();

        if let Some(nonce) = nonce {
            state.challenge_nonce = nonce;
        }

        let prepared = match request {
            Request::Put => state.prepare_put(),
            Request::Get => state.prepare_get(),
            _ => Ok(()),
        };
        if let Err(err) = prepared {
            state.finish_current(Some(err));
            return;
        }

        let non_header_data = [flags.bits(), 0];
        let data: &[u8] = if request == Request::SetPath {
            &non_header_data
        } else {
            &[]
        };

        let started = match headers {
            Ok(headers) => self
                .socket
                .send_request(request, headers, data, state)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = started {
            tracing::warn!("Cannot start {} request: {}", request, e);
            state.finish_current(Some(ClientError::UnknownError(
                "Error starting OBEX request".into(),
            )));
        }
    }

    fn resend_with_auth_response(&mut self) {
        let response = std::mem::take(&mut self.state.next_auth_response);
        let Some(cmd) = self.state.queue.front_mut() else {
            return;
        };
        cmd.header.remove(header_id::AUTH_RESPONSE);
        if let Err(e) = cmd.header.set(header_id::AUTH_RESPONSE, response) {
            tracing::warn!("Cannot attach authentication response: {}", e);
            self.state.finish_current(Some(ClientError::UnknownError(
                "Error starting OBEX request".into(),
            )));
            return;
        }

        self.state.sent_auth_response = true;
        self.perform_command();
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Id of the command at the head of the queue, or 0.
    pub fn current_id(&self) -> CommandId {
        self.state.queue.front().map(|c| c.id).unwrap_or(0)
    }

    pub fn current_request(&self) -> Option<Request> {
        self.state.current_request()
    }

    /// Whether commands are queued behind the current one.
    pub fn has_pending_requests(&self) -> bool {
        self.state.queue.len() > 1
    }

    /// Drops queued commands, keeping the current one.
    pub fn clear_pending_requests(&mut self) {
        self.state.queue.truncate(1);
    }

    pub fn last_response_code(&self) -> ResponseCode {
        self.state.last_response_code
    }

    /// Headers of the last response, without any Auth-Response.
    pub fn last_response_header(&self) -> &HeaderSet {
        &self.state.last_response_header
    }

    pub fn connection_id(&self) -> Option<u32> {
        self.state.connection_id
    }

    pub fn has_connection_id(&self) -> bool {
        self.state.connection_id.is_some()
    }

    /// Error of the last finished command.
    pub fn error(&self) -> Option<&ClientError> {
        self.state.error.as_ref()
    }

    pub fn error_kind(&self) -> ClientErrorKind {
        self.state
            .error
            .as_ref()
            .map(ClientError::kind)
            .unwrap_or_default()
    }

    pub fn error_string(&self) -> &str {
        self.state
            .error
            .as_ref()
            .map(ClientError::message)
            .unwrap_or("Unknown error")
    }

    /// Copies received Get data into `buf`, returning the number of bytes
    /// copied.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.state.received.len());
        buf[..n].copy_from_slice(&self.state.received[..n]);
        self.state.received.advance(n);
        n
    }

    pub fn read_all(&mut self) -> Bytes {
        self.state.received.split().freeze()
    }

    pub fn bytes_available(&self) -> usize {
        self.state.received.len()
    }
}
