//! Server side of the packet engine.
//!
//! A [`ServerSocket`] receives request packets and answers each one. It
//! tells Put apart from Put-Delete by waiting for body data before
//! notifying the [`ServerSink`] of a Put, accumulates request headers
//! across packets, streams Get bodies pulled from the sink, and ends an
//! operation as soon as a non-success response is chosen.

use crate::config::SocketConfig;
use crate::error::SocketError;
use crate::socket::{ObexSocket, ReadStatus};
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use obex_protocol::{
    header_id, opcode, ConnectParams, HeaderSet, Packet, RawHeader, RawPacket, Request,
    ResponseCode, CONNECT_PREFIX_SIZE, PACKET_HEADER_SIZE,
};
use std::collections::VecDeque;

/// Receives server-side packet engine events.
///
/// Every method that returns a [`ResponseCode`] chooses the response to
/// the packet being handled. Success keeps the operation going; anything
/// else refuses it and is sent as the final response.
pub trait ServerSink {
    /// A new request arrived. Put requests are reported once it is known
    /// whether they carry a body.
    fn accept_incoming_request(&mut self, request: Request) -> ResponseCode;

    /// The first body data of a Put arrived; `headers` are the request
    /// headers received so far.
    fn received_request_first_packet(
        &mut self,
        request: Request,
        headers: HeaderSet,
    ) -> (ResponseCode, HeaderSet);

    /// The final packet of a request arrived.
    fn received_request(
        &mut self,
        request: Request,
        headers: HeaderSet,
        non_header_data: &[u8],
    ) -> (ResponseCode, HeaderSet);

    fn body_data_available(&mut self, data: &[u8]) -> ResponseCode;

    /// Supplies the next chunk of a Get body. An empty chunk ends it.
    fn body_data_required(&mut self) -> (ResponseCode, Bytes);

    /// The final response to `request` was sent.
    fn request_done(&mut self, request: Request);

    /// The client aborted the request in progress.
    fn aborted(&mut self);

    fn link_error(&mut self);

    fn parse_error(&mut self);

    /// Headers could not be read or written.
    fn unknown_error(&mut self);

    fn disconnected(&mut self);

    /// Checked after every packet; when true the transport is closed and
    /// remaining input is ignored.
    fn is_closing(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct BodyPump {
    buffer: BytesMut,
    ended: bool,
}

impl BodyPump {
    /// Pulls Get body data until more than `room` bytes are buffered or
    /// the body has ended. Fails with the sink's response code.
    fn fill(&mut self, room: usize, sink: &mut impl ServerSink) -> Result<(), ResponseCode> {
        while !self.ended && self.buffer.len() <= room {
            let (code, data) = sink.body_data_required();
            if !code.is_success() {
                return Err(code);
            }
            if data.is_empty() {
                self.ended = true;
            } else {
                self.buffer.extend_from_slice(&data);
            }
        }
        Ok(())
    }
}

/// A request being received or answered.
#[derive(Debug)]
struct Incoming {
    opcode: u8,
    refused: Option<ResponseCode>,
    checked: bool,
    got_body: bool,
    complete: bool,
    request_headers: Vec<RawHeader>,
    non_header_data: Bytes,
    response_headers: VecDeque<RawHeader>,
    get_body: Option<BodyPump>,
}

impl Incoming {
    fn new(opcode: u8) -> Self {
        Self {
            opcode,
            refused: None,
            checked: false,
            got_body: false,
            complete: false,
            request_headers: Vec::new(),
            non_header_data: Bytes::new(),
            response_headers: VecDeque::new(),
            get_body: None,
        }
    }

    /// Only meaningful once the final packet has been received, since a
    /// Put without body data is a Put-Delete.
    fn request(&self) -> Option<Request> {
        Request::from_opcode(self.opcode, self.got_body)
    }

    fn set_next_response(&mut self, code: ResponseCode) {
        if !(code.is_success() || code.is_continue()) && self.refused.is_none() {
            tracing::debug!("Refusing request {:#04x} with {}", self.opcode, code);
            self.refused = Some(code);
        }
    }

    fn queue_response_headers(&mut self, headers: &HeaderSet, sink: &mut impl ServerSink) {
        match headers.write_headers() {
            Ok(raw) => self.response_headers.extend(raw),
            Err(e) => {
                tracing::warn!("Unable to write response headers: {}", e);
                sink.unknown_error();
                self.set_next_response(ResponseCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    fn read_request_headers(&self, sink: &mut impl ServerSink) -> Option<HeaderSet> {
        match HeaderSet::read_headers(&self.request_headers) {
            Ok(headers) => Some(headers),
            Err(e) => {
                tracing::warn!("Unable to read request headers: {}", e);
                sink.unknown_error();
                None
            }
        }
    }
}

/// The server role of the packet engine.
pub struct ServerSocket<T: Transport> {
    socket: ObexSocket<T>,
    op: Option<Incoming>,
}

impl<T: Transport> ServerSocket<T> {
    pub fn new(transport: T, config: SocketConfig) -> Self {
        Self {
            socket: ObexSocket::new(transport, config),
            op: None,
        }
    }

    pub fn socket(&self) -> &ObexSocket<T> {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut ObexSocket<T> {
        &mut self.socket
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_open()
    }

    pub fn close(&mut self) {
        self.op = None;
        self.socket.close();
    }

    /// Whether a request is being received or answered.
    pub fn is_busy(&self) -> bool {
        self.op.is_some()
    }

    /// Reads available input and answers every complete request packet.
    pub fn process_input(&mut self, sink: &mut impl ServerSink) {
        let status = self.socket.read_available();
        if let ReadStatus::Failed(e) = &status {
            tracing::warn!("OBEX transport read failed: {}", e);
            self.op = None;
            sink.link_error();
            return;
        }

        loop {
            match self.socket.next_raw() {
                Ok(Some(raw)) => {
                    self.handle_request(raw, sink);
                    if sink.is_closing() {
                        self.close();
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Malformed OBEX request: {}", e);
                    self.socket.discard_input();
                    self.op = None;
                    sink.parse_error();
                    break;
                }
            }
        }

        if let ReadStatus::Closed = status {
            tracing::debug!("OBEX transport closed");
            self.op = None;
            sink.disconnected();
        }
    }

    fn handle_request(&mut self, raw: RawPacket, sink: &mut impl ServerSink) {
        let packet = match raw.into_request() {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!("Malformed OBEX request: {}", e);
                self.op = None;
                sink.parse_error();
                return;
            }
        };

        if packet.code == opcode::ABORT {
            self.handle_abort(sink);
            return;
        }

        let base = opcode::base(packet.code);
        if Request::from_opcode(base, false).is_none() {
            tracing::debug!("Unsupported opcode {:#04x}", packet.code);
            self.op = None;
            self.send_or_fail(Packet::new(ResponseCode::NOT_IMPLEMENTED.as_u8()), sink);
            return;
        }

        let mut op = match self.op.take() {
            Some(op) if op.opcode == base && !op.complete => op,
            Some(op) if op.opcode == base && base == opcode::GET => op,
            Some(op) => {
                tracing::warn!(
                    "Request {:#04x} arrived while {:#04x} was in progress",
                    base,
                    op.opcode
                );
                self.start_request(base, &packet, sink)
            }
            None => self.start_request(base, &packet, sink),
        };

        if base == opcode::SETPATH {
            op.non_header_data = packet.prefix.clone();
        }
        let is_final = packet.is_final();
        self.receive_headers(&mut op, packet.headers, sink);

        if is_final && !op.complete {
            op.complete = true;
            self.receive_final_packet(&mut op, sink);
        }

        self.respond(op, sink);
    }

    fn start_request(&mut self, base: u8, packet: &Packet, sink: &mut impl ServerSink) -> Incoming {
        let mut op = Incoming::new(base);

        if base == opcode::CONNECT {
            if let Some(params) = packet.connect_params() {
                self.socket.set_peer_mtu(params.max_packet_length);
            }
        }

        // A Put is not reported until body data (or the final packet)
        // shows whether it is a Put-Delete.
        if base != opcode::PUT {
            if let Some(request) = op.request() {
                op.checked = true;
                let code = sink.accept_incoming_request(request);
                op.set_next_response(code);
            }
        }
        op
    }

    fn receive_headers(
        &mut self,
        op: &mut Incoming,
        headers: Vec<RawHeader>,
        sink: &mut impl ServerSink,
    ) {
        for header in headers {
            if !header.is_body() {
                op.request_headers.push(header);
                continue;
            }
            if op.opcode != opcode::PUT {
                continue;
            }

            op.got_body = true;
            if op.refused.is_some() {
                continue;
            }

            if !op.checked {
                op.checked = true;
                op.set_next_response(sink.accept_incoming_request(Request::Put));
                if op.refused.is_some() {
                    continue;
                }

                let Some(request_headers) = op.read_request_headers(sink) else {
                    op.set_next_response(ResponseCode::INTERNAL_SERVER_ERROR);
                    continue;
                };
                let (code, response) =
                    sink.received_request_first_packet(Request::Put, request_headers);
                op.queue_response_headers(&response, sink);
                op.set_next_response(code);
                if op.refused.is_some() {
                    continue;
                }
            }

            if !header.data.is_empty() {
                let code = sink.body_data_available(&header.data);
                op.set_next_response(code);
            }
        }
    }

    fn receive_final_packet(&mut self, op: &mut Incoming, sink: &mut impl ServerSink) {
        if op.refused.is_some() {
            return;
        }
        let Some(request) = op.request() else {
            return;
        };

        if !op.checked {
            op.checked = true;
            op.set_next_response(sink.accept_incoming_request(request));
            if op.refused.is_some() {
                return;
            }
        }

        let Some(headers) = op.read_request_headers(sink) else {
            op.set_next_response(ResponseCode::INTERNAL_SERVER_ERROR);
            return;
        };
        let non_header_data = op.non_header_data.clone();
        let (code, response) = sink.received_request(request, headers, &non_header_data);
        op.queue_response_headers(&response, sink);
        op.set_next_response(code);

        if op.refused.is_none() && request == Request::Get {
            op.get_body = Some(BodyPump::default());
        }
    }

    fn respond(&mut self, mut op: Incoming, sink: &mut impl ServerSink) {
        let mtu = self.socket.peer_mtu() as usize;

        if let Some(code) = op.refused {
            let packet = self.final_response_packet(&mut op, code, mtu, sink);
            self.finish(op, packet, sink);
            return;
        }

        if !op.complete {
            let packet = self.response_packet(&mut op, ResponseCode::CONTINUE, mtu);
            if self.send_or_fail(packet, sink) {
                self.op = Some(op);
            }
            return;
        }

        if op.get_body.is_some() {
            if self.header_never_fits(&op, mtu) {
                let packet = self.final_response_packet(&mut op, ResponseCode::SUCCESS, mtu, sink);
                self.finish(op, packet, sink);
                return;
            }
            let (packet, done) = self.get_response_packet(&mut op, mtu, sink);
            if done {
                self.finish(op, packet, sink);
            } else if self.send_or_fail(packet, sink) {
                self.op = Some(op);
            }
            return;
        }

        let packet = self.final_response_packet(&mut op, ResponseCode::SUCCESS, mtu, sink);
        self.finish(op, packet, sink);
    }

    /// Builds a response that must carry every queued header. When they do
    /// not all fit, none are sent and the response becomes Internal Server
    /// Error.
    fn final_response_packet(
        &self,
        op: &mut Incoming,
        code: ResponseCode,
        mtu: usize,
        sink: &mut impl ServerSink,
    ) -> Packet {
        let mut packet = self.response_packet(op, code, mtu);
        if !op.response_headers.is_empty() {
            tracing::warn!(
                "{} response headers do not fit in the final packet",
                op.response_headers.len()
            );
            op.response_headers.clear();
            packet.code = ResponseCode::INTERNAL_SERVER_ERROR.as_u8();
            packet.headers.clear();
            sink.unknown_error();
        }
        packet
    }

    /// Whether the next queued header is too large for any packet.
    fn header_never_fits(&self, op: &Incoming, mtu: usize) -> bool {
        let prefix_len = if op.opcode == opcode::CONNECT {
            CONNECT_PREFIX_SIZE
        } else {
            0
        };
        op.response_headers
            .front()
            .is_some_and(|h| PACKET_HEADER_SIZE + prefix_len + h.encoded_len() > mtu)
    }

    /// Sends the final response and reports the request as done.
    fn finish(&mut self, op: Incoming, packet: Packet, sink: &mut impl ServerSink) {
        if !self.send_or_fail(packet, sink) {
            return;
        }
        if op.opcode == opcode::DISCONNECT {
            self.socket.reset_peer_mtu();
        }
        if let Some(request) = op.request() {
            tracing::debug!("Sent final response to {}", request);
            sink.request_done(request);
        }
    }

    /// Builds a response carrying as many queued headers as fit. The rest
    /// stay queued.
    fn response_packet(&self, op: &mut Incoming, code: ResponseCode, mtu: usize) -> Packet {
        let mut packet = Packet::new(code.as_u8());
        if op.opcode == opcode::CONNECT {
            packet.prefix =
                Bytes::copy_from_slice(&ConnectParams::new(self.socket.local_mtu()).encode());
        }
        let mut size = PACKET_HEADER_SIZE + packet.prefix.len();
        while op
            .response_headers
            .front()
            .is_some_and(|h| size + h.encoded_len() <= mtu)
        {
            if let Some(header) = op.response_headers.pop_front() {
                size += header.encoded_len();
                packet.headers.push(header);
            }
        }
        packet
    }

    /// Builds the next packet of a Get response. Returns true with the
    /// final packet.
    fn get_response_packet(
        &self,
        op: &mut Incoming,
        mtu: usize,
        sink: &mut impl ServerSink,
    ) -> (Packet, bool) {
        let mut packet = self.response_packet(op, ResponseCode::CONTINUE, mtu);
        if !op.response_headers.is_empty() {
            return (packet, false);
        }

        let space = mtu - packet.encoded_len();
        if space <= 3 {
            return (packet, false);
        }
        let room = space - 3;

        let filled = match op.get_body.as_mut() {
            Some(pump) => pump.fill(room, sink),
            None => return (packet, false),
        };
        if let Err(code) = filled {
            op.set_next_response(code);
            let mut refused = Packet::new(code.as_u8());
            refused.headers = packet.headers;
            return (refused, true);
        }

        let Some(pump) = op.get_body.as_mut() else {
            return (packet, false);
        };
        if pump.ended && pump.buffer.len() <= room {
            let data = pump.buffer.split().freeze();
            packet.code = ResponseCode::SUCCESS.as_u8();
            packet
                .headers
                .push(RawHeader::new(header_id::END_OF_BODY, data));
            (packet, true)
        } else {
            let data = pump.buffer.split_to(room).freeze();
            packet.headers.push(RawHeader::new(header_id::BODY, data));
            (packet, false)
        }
    }

    fn handle_abort(&mut self, sink: &mut impl ServerSink) {
        let had_request = self.op.take().is_some();
        if !self.send_or_fail(Packet::new(ResponseCode::SUCCESS.as_u8()), sink) {
            return;
        }
        if had_request {
            tracing::debug!("Request aborted by client");
            sink.aborted();
        }
    }

    fn send_or_fail(&mut self, packet: Packet, sink: &mut impl ServerSink) -> bool {
        match self.socket.send(&packet) {
            Ok(()) => true,
            Err(SocketError::NotOpen) => {
                self.op = None;
                false
            }
            Err(e) => {
                tracing::warn!("Failed to send response {:#04x}: {}", packet.code, e);
                self.op = None;
                sink.link_error();
                false
            }
        }
    }
}
