//! Server session.
//!
//! A [`ServerSession`] answers the requests arriving on one transport by
//! dispatching them to a [`ServerHandler`]. It gates requests on the
//! handler's capabilities, verifies authentication responses to
//! challenges the handler staged, answers challenges sent by the client,
//! and makes sure each request reaches its handler exactly once.

use crate::error::ServerError;
use crate::handler::{Capabilities, ServerContext, ServerHandler};
use bytes::Bytes;
use obex_protocol::{
    header_id, AuthChallenge, AuthResponse, HeaderSet, HeaderValue, Request, ResponseCode,
    SetPathFlags,
};
use obex_transport::{ServerSink, ServerSocket, SocketConfig, Transport};

/// Per-session state that the packet engine reports into.
struct SessionState<H> {
    handler: H,
    ctx: ServerContext,
    /// Computed on the first request.
    capabilities: Option<Capabilities>,
    /// Whether the handler has run for the current request.
    invoked: bool,
    disconnected: bool,
}

impl<H: ServerHandler> SessionState<H> {
    fn new(handler: H) -> Self {
        Self {
            handler,
            ctx: ServerContext::new(),
            capabilities: None,
            invoked: false,
            disconnected: false,
        }
    }

    fn capabilities(&mut self) -> Capabilities {
        match self.capabilities {
            Some(caps) => caps,
            None => {
                let caps = self.handler.capabilities();
                tracing::debug!("OBEX server handler serves {}", caps);
                self.capabilities = Some(caps);
                caps
            }
        }
    }

    fn error_occurred(&mut self, error: ServerError) {
        if self.ctx.is_closed() {
            tracing::debug!("OBEX server session closed, ignoring error: {}", error);
            return;
        }
        self.handler.error(&mut self.ctx, &error);
    }

    /// Runs the handler for `request` once its authentication headers
    /// have been dealt with.
    fn process_request_header(
        &mut self,
        request: Request,
        mut header: HeaderSet,
        non_header_data: &[u8],
    ) -> ResponseCode {
        if let Some(data) = header.get(header_id::AUTH_RESPONSE).and_then(HeaderValue::as_bytes) {
            let data = data.clone();
            let code = self.read_authentication_response(&data);
            if !code.is_success() {
                return code;
            }
            header.remove(header_id::AUTH_RESPONSE);
        } else if !self.ctx.challenge_nonce().is_empty() {
            self.error_occurred(ServerError::AuthenticationFailed(
                "Did not receive authentication response".into(),
            ));
            return ResponseCode::UNAUTHORIZED;
        }

        let mut challenge = None;
        if let Some(data) = header.get(header_id::AUTH_CHALLENGE).and_then(HeaderValue::as_bytes) {
            match AuthChallenge::parse(data) {
                Ok(parsed) => challenge = Some(parsed),
                Err(e) => {
                    tracing::debug!("Bad client authentication challenge: {}", e);
                    self.error_occurred(ServerError::AuthenticationFailed(
                        "Cannot read authentication challenge".into(),
                    ));
                    return ResponseCode::BAD_REQUEST;
                }
            }
            header.remove(header_id::AUTH_CHALLENGE);
        }

        let mut response = self.invoke(request, &header, non_header_data);
        if self.ctx.is_closed() {
            return ResponseCode::INTERNAL_SERVER_ERROR;
        }

        if let Some(challenge) = challenge {
            if response.is_success() {
                response = self.process_authentication_challenge(challenge);
            }
        }

        self.invoked = true;
        response
    }

    fn invoke(&mut self, request: Request, header: &HeaderSet, non_header_data: &[u8]) -> ResponseCode {
        tracing::debug!("Dispatching {} with {} headers", request, header.len());
        let ctx = &mut self.ctx;
        match request {
            Request::Connect => self.handler.connect(ctx, header),
            Request::Disconnect => self.handler.disconnect(ctx, header),
            Request::Put => self.handler.put(ctx, header),
            Request::PutDelete => self.handler.put_delete(ctx, header),
            Request::Get => self.handler.get(ctx, header),
            Request::SetPath => {
                let flags = SetPathFlags::from_non_header_data(non_header_data);
                self.handler.set_path(ctx, header, flags)
            }
        }
    }

    fn process_authentication_challenge(&mut self, mut challenge: AuthChallenge) -> ResponseCode {
        self.handler.authentication_required(&mut challenge);

        if !challenge.is_modified() {
            self.error_occurred(ServerError::AuthenticationFailed(
                "Server did not provide username or password for authentication".into(),
            ));
            // Staged headers assumed the request would succeed.
            self.ctx.clear_response_header();
            return ResponseCode::INTERNAL_SERVER_ERROR;
        }

        let staged = challenge
            .to_response(&[])
            .map_err(|e| ServerError::UnknownError(e.to_string()))
            .and_then(|bytes| self.ctx.stage_auth_response(bytes));
        if let Err(e) = staged {
            tracing::debug!("Cannot answer client challenge: {}", e);
            self.error_occurred(ServerError::AuthenticationFailed(
                "Error responding to authentication challenge".into(),
            ));
            self.ctx.clear_response_header();
            return ResponseCode::INTERNAL_SERVER_ERROR;
        }
        ResponseCode::SUCCESS
    }

    fn read_authentication_response(&mut self, data: &Bytes) -> ResponseCode {
        let nonce = self.ctx.challenge_nonce().clone();
        let response = match AuthResponse::parse(data, nonce) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Bad client authentication response: {}", e);
                self.error_occurred(ServerError::AuthenticationFailed(
                    "Invalid client authentication response".into(),
                ));
                return ResponseCode::BAD_REQUEST;
            }
        };

        if !self.handler.authentication_response(&response) {
            self.error_occurred(ServerError::AuthenticationFailed(
                "Authentication failed".into(),
            ));
            return ResponseCode::UNAUTHORIZED;
        }

        self.ctx.clear_challenge_nonce();
        ResponseCode::SUCCESS
    }

    /// Response headers staged for the packet being answered.
    fn respond(&mut self, code: ResponseCode) -> (ResponseCode, HeaderSet) {
        if self.ctx.is_closed() {
            return (ResponseCode::INTERNAL_SERVER_ERROR, HeaderSet::new());
        }
        (code, self.ctx.take_response_header())
    }
}

impl<H: ServerHandler> ServerSink for SessionState<H> {
    fn accept_incoming_request(&mut self, request: Request) -> ResponseCode {
        tracing::debug!("Incoming {} request", request);
        self.invoked = false;

        if self.capabilities().supports(request) {
            ResponseCode::SUCCESS
        } else {
            tracing::debug!("{} is not served, denying request", request);
            ResponseCode::NOT_IMPLEMENTED
        }
    }

    fn received_request_first_packet(
        &mut self,
        request: Request,
        headers: HeaderSet,
    ) -> (ResponseCode, HeaderSet) {
        tracing::debug!("First packet of {} with {} headers", request, headers.len());
        let code = self.process_request_header(request, headers, &[]);
        self.respond(code)
    }

    fn received_request(
        &mut self,
        request: Request,
        headers: HeaderSet,
        non_header_data: &[u8],
    ) -> (ResponseCode, HeaderSet) {
        tracing::debug!("All packets of {} received", request);
        let code = if self.invoked {
            ResponseCode::SUCCESS
        } else {
            self.process_request_header(request, headers, non_header_data)
        };
        self.respond(code)
    }

    fn body_data_available(&mut self, data: &[u8]) -> ResponseCode {
        self.handler.data_available(&mut self.ctx, data)
    }

    fn body_data_required(&mut self) -> (ResponseCode, Bytes) {
        self.handler.provide_data(&mut self.ctx)
    }

    fn request_done(&mut self, request: Request) {
        tracing::debug!("Done {} request", request);
        if self.capabilities().supports(request) {
            self.handler.final_response_sent(&mut self.ctx, request);
        }
    }

    fn aborted(&mut self) {
        self.error_occurred(ServerError::Aborted("Request aborted".into()));
    }

    fn link_error(&mut self) {
        self.error_occurred(ServerError::ConnectionError("Connection error".into()));
    }

    fn parse_error(&mut self) {
        self.error_occurred(ServerError::InvalidRequest("Invalid client request".into()));
    }

    fn unknown_error(&mut self) {
        self.error_occurred(ServerError::UnknownError("Unknown error".into()));
    }

    fn disconnected(&mut self) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;
        tracing::debug!("OBEX server transport disconnected");
        self.error_occurred(ServerError::ConnectionError("Connection error".into()));
    }

    fn is_closing(&self) -> bool {
        self.ctx.is_closed()
    }
}

/// Serves OBEX requests arriving on a transport.
pub struct ServerSession<H: ServerHandler, T: Transport> {
    socket: ServerSocket<T>,
    state: SessionState<H>,
}

impl<H: ServerHandler, T: Transport> ServerSession<H, T> {
    pub fn new(handler: H, transport: T) -> Self {
        Self::with_config(handler, transport, SocketConfig::default())
    }

    pub fn with_config(handler: H, transport: T, config: SocketConfig) -> Self {
        Self {
            socket: ServerSocket::new(transport, config),
            state: SessionState::new(handler),
        }
    }

    pub fn handler(&self) -> &H {
        &self.state.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.state.handler
    }

    pub fn transport(&self) -> &T {
        self.socket.socket().transport()
    }

    /// Stages headers for the next response, outside any handler call.
    pub fn set_next_response_header(&mut self, header: HeaderSet) {
        self.state.ctx.set_next_response_header(header);
    }

    /// Answers every complete request buffered on the transport.
    pub fn process_input(&mut self) {
        if self.state.ctx.is_closed() {
            return;
        }
        self.socket.process_input(&mut self.state);
        if self.state.ctx.is_closed() && self.socket.is_open() {
            self.socket.close();
        }
    }

    /// Whether a request is being received or answered.
    pub fn is_busy(&self) -> bool {
        self.socket.is_busy()
    }

    /// Closes the session and its transport. Further input is ignored.
    pub fn close(&mut self) {
        if !self.state.ctx.is_closed() {
            tracing::debug!("Closing OBEX server session");
        }
        self.state.ctx.close();
        self.socket.close();
    }

    pub fn is_closed(&self) -> bool {
        self.state.ctx.is_closed()
    }
}

impl<H: ServerHandler, T: Transport> Drop for ServerSession<H, T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obex_client::{ClientErrorKind, ClientEvent, ClientSession, Credentials};
    use obex_protocol::AuthChallengeOptions;
    use obex_transport::MemoryTransport;
    use std::collections::HashMap;

    /// Records every call; answers according to its settings.
    #[derive(Default)]
    struct Recorder {
        caps: Capabilities,
        calls: HashMap<Request, usize>,
        headers: Vec<HeaderSet>,
        flags: Vec<SetPathFlags>,
        received: Vec<u8>,
        served: Option<Bytes>,
        reply: HeaderSet,
        challenge_on_connect: bool,
        password: Option<String>,
        client_password: Option<String>,
        errors: Vec<ServerError>,
        finished: Vec<Request>,
    }

    impl Recorder {
        fn serving(caps: Capabilities) -> Self {
            Self {
                caps,
                ..Default::default()
            }
        }

        fn called(&self, request: Request) -> usize {
            self.calls.get(&request).copied().unwrap_or(0)
        }

        fn record(&mut self, ctx: &mut ServerContext, request: Request, header: &HeaderSet) {
            *self.calls.entry(request).or_default() += 1;
            self.headers.push(header.clone());
            if !self.reply.is_empty() {
                ctx.set_next_response_header(self.reply.clone());
            }
        }
    }

    impl ServerHandler for Recorder {
        fn capabilities(&self) -> Capabilities {
            self.caps
        }

        fn connect(&mut self, ctx: &mut ServerContext, header: &HeaderSet) -> ResponseCode {
            self.record(ctx, Request::Connect, header);
            if self.challenge_on_connect && !ctx.next_response_header().contains(header_id::AUTH_CHALLENGE) {
                let mut challenge = HeaderSet::new();
                challenge
                    .set_authentication_challenge(AuthChallengeOptions::new(), "inbox")
                    .unwrap();
                ctx.set_next_response_header(challenge);
                self.challenge_on_connect = false;
                return ResponseCode::UNAUTHORIZED;
            }
            ResponseCode::SUCCESS
        }

        fn disconnect(&mut self, ctx: &mut ServerContext, header: &HeaderSet) -> ResponseCode {
            self.record(ctx, Request::Disconnect, header);
            ResponseCode::SUCCESS
        }

        fn put(&mut self, ctx: &mut ServerContext, header: &HeaderSet) -> ResponseCode {
            self.record(ctx, Request::Put, header);
            ResponseCode::SUCCESS
        }

        fn put_delete(&mut self, ctx: &mut ServerContext, header: &HeaderSet) -> ResponseCode {
            self.record(ctx, Request::PutDelete, header);
            ResponseCode::SUCCESS
        }

        fn get(&mut self, ctx: &mut ServerContext, header: &HeaderSet) -> ResponseCode {
            self.record(ctx, Request::Get, header);
            if self.served.is_none() {
                return ResponseCode::NOT_FOUND;
            }
            ResponseCode::SUCCESS
        }

        fn set_path(
            &mut self,
            ctx: &mut ServerContext,
            header: &HeaderSet,
            flags: SetPathFlags,
        ) -> ResponseCode {
            self.record(ctx, Request::SetPath, header);
            self.flags.push(flags);
            ResponseCode::SUCCESS
        }

        fn data_available(&mut self, _ctx: &mut ServerContext, data: &[u8]) -> ResponseCode {
            self.received.extend_from_slice(data);
            ResponseCode::SUCCESS
        }

        fn provide_data(&mut self, _ctx: &mut ServerContext) -> (ResponseCode, Bytes) {
            let chunk = self.served.take().unwrap_or_default();
            self.served = Some(Bytes::new());
            (ResponseCode::SUCCESS, chunk)
        }

        fn error(&mut self, _ctx: &mut ServerContext, error: &ServerError) {
            self.errors.push(error.clone());
        }

        fn authentication_required(&mut self, challenge: &mut AuthChallenge) {
            if let Some(password) = &self.client_password {
                challenge.set_password(password.clone());
            }
        }

        fn authentication_response(&mut self, response: &AuthResponse) -> bool {
            self.password
                .as_deref()
                .is_some_and(|password| response.matches(password))
        }

        fn final_response_sent(&mut self, ctx: &mut ServerContext, request: Request) {
            self.finished.push(request);
            if request == Request::Disconnect {
                ctx.close();
            }
        }
    }

    struct Harness {
        client: ClientSession<MemoryTransport>,
        server: ServerSession<Recorder, MemoryTransport>,
    }

    impl Harness {
        fn new(handler: Recorder) -> Self {
            let (a, b) = MemoryTransport::pair();
            let config = SocketConfig::new().with_mtu(255);
            Self {
                client: ClientSession::with_config(a, config),
                server: ServerSession::with_config(handler, b, config),
            }
        }

        fn run(&mut self) -> Vec<ClientEvent> {
            for _ in 0..10_000 {
                self.client.poll();
                self.server.process_input();
                if self.client.is_idle() {
                    return self.client.take_events();
                }
            }
            panic!("client session did not go idle");
        }

        fn handler(&self) -> &Recorder {
            self.server.handler()
        }
    }

    fn finished_with_error(events: &[ClientEvent]) -> Option<bool> {
        events.iter().find_map(|e| match e {
            ClientEvent::RequestFinished { error, .. } => Some(*error),
            _ => None,
        })
    }

    #[test]
    fn test_unserved_request_is_not_implemented() {
        let mut h = Harness::new(Recorder::serving(Capabilities::empty().with(Request::Connect)));

        let mut header = HeaderSet::new();
        header.set_name("notes.txt");
        h.client.put(header, &b"some data"[..]);
        h.client.get(HeaderSet::new());
        h.run();

        assert_eq!(h.client.error_kind(), ClientErrorKind::RequestFailed);
        assert_eq!(h.client.last_response_code(), ResponseCode::NOT_IMPLEMENTED);
        assert_eq!(h.handler().called(Request::Put), 0);
        assert_eq!(h.handler().called(Request::Get), 0);
        assert!(h.handler().received.is_empty());
        assert!(h.handler().finished.is_empty());
    }

    #[test]
    fn test_connect_stages_response_headers() {
        let mut handler = Recorder::serving(Capabilities::all());
        handler.reply.set_who(Bytes::from_static(b"inbox"));
        handler.reply.set_connection_id(3);
        let mut h = Harness::new(handler);

        h.client.connect(HeaderSet::new());
        let events = h.run();

        assert_eq!(finished_with_error(&events), Some(false));
        assert_eq!(h.client.connection_id(), Some(3));
        assert_eq!(h.client.last_response_header().who().map(|w| &w[..]), Some(&b"inbox"[..]));
        assert_eq!(h.handler().called(Request::Connect), 1);
        assert_eq!(h.handler().finished, vec![Request::Connect]);
    }

    #[test]
    fn test_response_headers_that_do_not_fit_fail_the_request() {
        let mut handler = Recorder::serving(Capabilities::all());
        handler.reply.set_who(Bytes::from(vec![0x42u8; 200]));
        handler.reply.set_description(&"d".repeat(100));
        let mut h = Harness::new(handler);

        h.client.connect(HeaderSet::new());
        let events = h.run();

        assert_eq!(finished_with_error(&events), Some(true));
        assert_eq!(
            h.client.last_response_code(),
            ResponseCode::INTERNAL_SERVER_ERROR
        );
        assert!(h.client.last_response_header().who().is_none());
        assert!(h.client.last_response_header().description().is_none());
        assert_eq!(
            h.handler().errors,
            vec![ServerError::UnknownError("Unknown error".into())]
        );
        assert_eq!(h.handler().finished, vec![Request::Connect]);
    }

    #[test]
    fn test_multi_packet_put_invokes_handler_once() {
        let mut h = Harness::new(Recorder::serving(Capabilities::all()));
        let body: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();

        let mut header = HeaderSet::new();
        header.set_name("big.bin");
        header.set_length(body.len() as u32);
        h.client.put(header, body.clone());
        let events = h.run();

        assert_eq!(finished_with_error(&events), Some(false));
        assert_eq!(h.handler().called(Request::Put), 1);
        assert_eq!(h.handler().headers[0].name(), Some("big.bin"));
        assert_eq!(h.handler().received, body);
        assert_eq!(h.handler().finished, vec![Request::Put]);
    }

    #[test]
    fn test_put_delete_and_set_path() {
        let mut h = Harness::new(Recorder::serving(Capabilities::all()));

        let mut header = HeaderSet::new();
        header.set_name("old.txt");
        h.client.put_delete(header);
        let mut header = HeaderSet::new();
        header.set_name("photos");
        h.client
            .set_path(header, SetPathFlags::new().with_back_up_one_level());
        h.run();

        assert_eq!(h.client.error_kind(), ClientErrorKind::NoError);
        assert_eq!(h.handler().called(Request::PutDelete), 1);
        assert_eq!(h.handler().called(Request::Put), 0);
        assert_eq!(h.handler().called(Request::SetPath), 1);
        assert!(h.handler().flags[0].backs_up_one_level());
        assert!(!h.handler().flags[0].no_path_creation());
    }

    #[test]
    fn test_get_streams_provided_data() {
        let mut handler = Recorder::serving(Capabilities::all());
        let data: Vec<u8> = (0..1500u32).map(|i| (i * 7) as u8).collect();
        handler.served = Some(Bytes::from(data.clone()));
        let mut h = Harness::new(handler);

        h.client.get(HeaderSet::new());
        h.run();

        assert_eq!(h.client.error_kind(), ClientErrorKind::NoError);
        assert_eq!(&h.client.read_all()[..], &data[..]);
        assert_eq!(h.handler().finished, vec![Request::Get]);
    }

    #[test]
    fn test_refused_get_still_reports_final_response() {
        let mut h = Harness::new(Recorder::serving(Capabilities::all()));

        h.client.get(HeaderSet::new());
        h.run();

        assert_eq!(h.client.last_response_code(), ResponseCode::NOT_FOUND);
        assert_eq!(h.handler().finished, vec![Request::Get]);
    }

    #[test]
    fn test_server_challenge_answered() {
        let mut handler = Recorder::serving(Capabilities::all());
        handler.challenge_on_connect = true;
        handler.password = Some("secret".into());
        let mut h = Harness::new(handler);
        h.client.set_authenticator(Credentials::new("", "secret"));

        h.client.connect(HeaderSet::new());
        let events = h.run();

        assert_eq!(finished_with_error(&events), Some(false));
        assert_eq!(h.handler().called(Request::Connect), 2);
        // The handler never sees the raw response.
        assert!(!h.handler().headers[1].contains(header_id::AUTH_RESPONSE));
        assert!(h.handler().errors.is_empty());
    }

    #[test]
    fn test_server_challenge_wrong_password() {
        let mut handler = Recorder::serving(Capabilities::all());
        handler.challenge_on_connect = true;
        handler.password = Some("secret".into());
        let mut h = Harness::new(handler);
        h.client.set_authenticator(Credentials::new("", "guess"));

        h.client.connect(HeaderSet::new());
        h.run();

        assert_eq!(h.client.error_kind(), ClientErrorKind::AuthenticationFailed);
        assert_eq!(h.handler().called(Request::Connect), 1);
        assert_eq!(
            h.handler().errors,
            vec![ServerError::AuthenticationFailed("Authentication failed".into())]
        );
    }

    #[test]
    fn test_ignored_challenge_is_unauthorized() {
        let mut h = Harness::new(Recorder::serving(Capabilities::all()));

        let mut challenge = HeaderSet::new();
        challenge
            .set_authentication_challenge(AuthChallengeOptions::new(), "")
            .unwrap();
        h.server.set_next_response_header(challenge);

        h.client.put_delete(HeaderSet::new());
        h.run();

        // The client has no credentials for the challenge that came back.
        assert_eq!(h.client.error_kind(), ClientErrorKind::AuthenticationFailed);
        assert_eq!(h.handler().called(Request::PutDelete), 0);
        assert_eq!(
            h.handler().errors,
            vec![ServerError::AuthenticationFailed(
                "Did not receive authentication response".into()
            )]
        );
    }

    #[test]
    fn test_client_challenge_answered() {
        let mut handler = Recorder::serving(Capabilities::all());
        handler.client_password = Some("shared".into());
        let mut h = Harness::new(handler);
        h.client.set_authenticator(Credentials::new("", "shared"));

        let mut header = HeaderSet::new();
        header
            .set_authentication_challenge(AuthChallengeOptions::new(), "phone")
            .unwrap();
        h.client.connect(header);
        let events = h.run();

        assert_eq!(finished_with_error(&events), Some(false));
        assert!(!h.handler().headers[0].contains(header_id::AUTH_CHALLENGE));
    }

    #[test]
    fn test_client_challenge_without_credentials() {
        let mut handler = Recorder::serving(Capabilities::all());
        handler.reply.set_description("only on success");
        let mut h = Harness::new(handler);

        let mut header = HeaderSet::new();
        header
            .set_authentication_challenge(AuthChallengeOptions::new(), "phone")
            .unwrap();
        h.client.connect(header);
        h.run();

        assert_eq!(h.client.last_response_code(), ResponseCode::INTERNAL_SERVER_ERROR);
        assert!(h.client.last_response_header().description().is_none());
        assert_eq!(h.handler().called(Request::Connect), 1);
        assert_eq!(
            h.handler().errors,
            vec![ServerError::AuthenticationFailed(
                "Server did not provide username or password for authentication".into()
            )]
        );
    }

    #[test]
    fn test_close_after_disconnect() {
        let mut h = Harness::new(Recorder::serving(Capabilities::all()));

        h.client.connect(HeaderSet::new());
        h.client.disconnect(HeaderSet::new());
        h.run();

        assert_eq!(h.client.error_kind(), ClientErrorKind::NoError);
        assert!(h.server.is_closed());
        assert!(!h.server.transport().is_open());
        assert_eq!(
            h.handler().finished,
            vec![Request::Connect, Request::Disconnect]
        );
        // Errors after close are not reported.
        h.server.process_input();
        assert!(h.handler().errors.is_empty());
    }

    #[test]
    fn test_disconnect_reported_once() {
        let (mut a, b) = MemoryTransport::pair();
        let mut server = ServerSession::new(Recorder::serving(Capabilities::all()), b);
        a.close();

        server.process_input();
        server.process_input();

        assert_eq!(
            server.handler().errors,
            vec![ServerError::ConnectionError("Connection error".into())]
        );
    }

    #[test]
    fn test_malformed_request() {
        let client = MemoryTransport::new();
        let mut server = ServerSession::new(Recorder::serving(Capabilities::all()), client.clone());

        // Declared length is shorter than the packet header.
        client.push_inbound(&[0x80, 0x00, 0x01]);
        server.process_input();

        assert_eq!(
            server.handler().errors,
            vec![ServerError::InvalidRequest("Invalid client request".into())]
        );
    }
}
