//! Scripted server side used by the session tests.

use bytes::Bytes;
use obex_protocol::{HeaderSet, Request, ResponseCode};
use obex_transport::ServerSink;

type Handler = Box<dyn FnMut(Request, &HeaderSet) -> (ResponseCode, HeaderSet)>;

/// Scripted server side.
pub(crate) struct Peer {
    handler: Handler,
    pub requests: Vec<(Request, HeaderSet)>,
    pub received: Vec<u8>,
    pub get_body: Bytes,
    pub aborts: usize,
}

impl Peer {
    pub fn new(
        handler: impl FnMut(Request, &HeaderSet) -> (ResponseCode, HeaderSet) + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Vec::new(),
            received: Vec::new(),
            get_body: Bytes::new(),
            aborts: 0,
        }
    }

    pub fn ok() -> Self {
        Self::new(|_, _| (ResponseCode::SUCCESS, HeaderSet::new()))
    }
}

impl ServerSink for Peer {
    fn accept_incoming_request(&mut self, _request: Request) -> ResponseCode {
        ResponseCode::SUCCESS
    }
    fn received_request_first_packet(
        &mut self,
        _request: Request,
        _headers: HeaderSet,
    ) -> (ResponseCode, HeaderSet) {
        (ResponseCode::SUCCESS, HeaderSet::new())
    }
    fn received_request(
        &mut self,
        request: Request,
        headers: HeaderSet,
        _non_header_data: &[u8],
    ) -> (ResponseCode, HeaderSet) {
        let result = (self.handler)(request, &headers);
        self.requests.push((request, headers));
        result
    }
    fn body_data_available(&mut self, data: &[u8]) -> ResponseCode {
        self.received.extend_from_slice(data);
        ResponseCode::SUCCESS
    }
    fn body_data_required(&mut self) -> (ResponseCode, Bytes) {
        let n = self.get_body.len().min(100);
        (ResponseCode::SUCCESS, self.get_body.split_to(n))
    }
    fn request_done(&mut self, _request: Request) {}
    fn aborted(&mut self) {
        self.aborts += 1;
    }
    fn link_error(&mut self) {}
    fn parse_error(&mut self) {}
    fn unknown_error(&mut self) {}
    fn disconnected(&mut self) {}
}
