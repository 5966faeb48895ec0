//! Request handlers.
//!
//! A [`ServerHandler`] declares which requests it serves through its
//! [`Capabilities`]; the session rejects everything else with
//! Not Implemented before any handler code runs.

use crate::error::ServerError;
use bytes::Bytes;
use obex_protocol::{header_id, AuthChallenge, AuthResponse, HeaderSet, Request, ResponseCode, SetPathFlags};
use std::fmt;

/// Set of requests a handler serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const CONNECT: u8 = 1 << 0;
    pub const DISCONNECT: u8 = 1 << 1;
    pub const PUT: u8 = 1 << 2;
    pub const PUT_DELETE: u8 = 1 << 3;
    pub const GET: u8 = 1 << 4;
    pub const SET_PATH: u8 = 1 << 5;

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self(
            Self::CONNECT
                | Self::DISCONNECT
                | Self::PUT
                | Self::PUT_DELETE
                | Self::GET
                | Self::SET_PATH,
        )
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::all().0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Adds the capability that serves `request`.
    pub fn with(mut self, request: Request) -> Self {
        self.0 |= Self::bit_for(request);
        self
    }

    pub fn supports(&self, request: Request) -> bool {
        self.0 & Self::bit_for(request) != 0
    }

    fn bit_for(request: Request) -> u8 {
        match request {
            Request::Connect => Self::CONNECT,
            Request::Disconnect => Self::DISCONNECT,
            Request::Put => Self::PUT,
            Request::PutDelete => Self::PUT_DELETE,
            Request::Get => Self::GET,
            Request::SetPath => Self::SET_PATH,
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            Request::Connect,
            Request::Disconnect,
            Request::Put,
            Request::PutDelete,
            Request::Get,
            Request::SetPath,
        ]
        .into_iter()
        .filter(|r| self.supports(*r))
        .map(|r| r.as_str())
        .collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// State a handler can touch while it runs: the headers staged for the
/// next response and the session's closed flag.
#[derive(Debug, Default)]
pub struct ServerContext {
    next_response_header: HeaderSet,
    challenge_nonce: Bytes,
    closed: bool,
}

impl ServerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `header` for the next response sent by the session. Staged
    /// headers are sent once and then cleared.
    ///
    /// If `header` carries an Auth-Challenge created with
    /// [`HeaderSet::set_authentication_challenge`], the client's next
    /// request must answer it.
    pub fn set_next_response_header(&mut self, header: HeaderSet) {
        if header.contains(header_id::AUTH_CHALLENGE) {
            self.challenge_nonce = header.challenge_nonce().clone();
        }
        self.next_response_header = header;
    }

    pub fn next_response_header(&self) -> &HeaderSet {
        &self.next_response_header
    }

    /// Closes the session. Input arriving afterwards is ignored.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn take_response_header(&mut self) -> HeaderSet {
        std::mem::take(&mut self.next_response_header)
    }

    pub(crate) fn clear_response_header(&mut self) {
        self.next_response_header.clear();
    }

    pub(crate) fn stage_auth_response(&mut self, response: Bytes) -> Result<(), ServerError> {
        self.next_response_header
            .set(header_id::AUTH_RESPONSE, response)
            .map_err(|e| ServerError::UnknownError(e.to_string()))
    }

    pub(crate) fn challenge_nonce(&self) -> &Bytes {
        &self.challenge_nonce
    }

    pub(crate) fn clear_challenge_nonce(&mut self) {
        self.challenge_nonce = Bytes::new();
    }
}

/// Serves requests received by a [`crate::ServerSession`].
///
/// Request methods return the response code to send: Success lets the
/// request continue, anything else refuses it. Only the requests listed in
/// [`ServerHandler::capabilities`] are ever dispatched, so the default
/// bodies are never reached for a well-formed handler.
pub trait ServerHandler {
    fn capabilities(&self) -> Capabilities;

    fn connect(&mut self, _ctx: &mut ServerContext, _header: &HeaderSet) -> ResponseCode {
        ResponseCode::NOT_IMPLEMENTED
    }

    fn disconnect(&mut self, _ctx: &mut ServerContext, _header: &HeaderSet) -> ResponseCode {
        ResponseCode::NOT_IMPLEMENTED
    }

    /// Called once per Put, before any body data is delivered.
    fn put(&mut self, _ctx: &mut ServerContext, _header: &HeaderSet) -> ResponseCode {
        ResponseCode::NOT_IMPLEMENTED
    }

    fn put_delete(&mut self, _ctx: &mut ServerContext, _header: &HeaderSet) -> ResponseCode {
        ResponseCode::NOT_IMPLEMENTED
    }

    /// Called once per Get. Body data is then pulled through
    /// [`ServerHandler::provide_data`].
    fn get(&mut self, _ctx: &mut ServerContext, _header: &HeaderSet) -> ResponseCode {
        ResponseCode::NOT_IMPLEMENTED
    }

    fn set_path(
        &mut self,
        _ctx: &mut ServerContext,
        _header: &HeaderSet,
        _flags: SetPathFlags,
    ) -> ResponseCode {
        ResponseCode::NOT_IMPLEMENTED
    }

    /// Receives a chunk of Put body data.
    fn data_available(&mut self, _ctx: &mut ServerContext, _data: &[u8]) -> ResponseCode {
        ResponseCode::INTERNAL_SERVER_ERROR
    }

    /// Supplies the next chunk of a Get body. An empty chunk ends the body.
    fn provide_data(&mut self, _ctx: &mut ServerContext) -> (ResponseCode, Bytes) {
        (ResponseCode::INTERNAL_SERVER_ERROR, Bytes::new())
    }

    /// Called when an error occurs. Connection errors close the session.
    fn error(&mut self, ctx: &mut ServerContext, error: &ServerError) {
        tracing::warn!("OBEX server session error: {}", error);
        if matches!(error, ServerError::ConnectionError(_)) {
            ctx.close();
        }
    }

    /// The client challenged the server. Set a user and password on
    /// `challenge` to answer it; leaving it untouched fails the request.
    fn authentication_required(&mut self, _challenge: &mut AuthChallenge) {}

    /// The client answered a challenge staged by this handler. Return
    /// true to accept it.
    fn authentication_response(&mut self, _response: &AuthResponse) -> bool {
        false
    }

    /// The final response to `request` was sent.
    fn final_response_sent(&mut self, _ctx: &mut ServerContext, _request: Request) {}
}
