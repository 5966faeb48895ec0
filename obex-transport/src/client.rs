//! Client side of the packet engine.
//!
//! A [`ClientSocket`] sends one request at a time. It packs request
//! headers and body data into packets no larger than the peer allows,
//! answers each Continue response with the next packet, and reports what
//! happens through a [`ClientSink`].

use crate::config::SocketConfig;
use crate::error::SocketError;
use crate::socket::{ObexSocket, ReadStatus};
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use obex_protocol::packet::CONNECT_PREFIX_SIZE;
use obex_protocol::{
    header_id, opcode, ConnectParams, HeaderSet, Packet, RawHeader, RawPacket, Request,
    ResponseCode, PACKET_HEADER_SIZE,
};
use std::collections::VecDeque;

/// Body data supplied for an outgoing Put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyChunk {
    Data(Bytes),
    /// No more data. An empty `Data` chunk means the same.
    End,
    /// The body source failed; the request is aborted.
    Error,
}

/// Receives client-side packet engine events.
pub trait ClientSink {
    /// A Continue response arrived for a request still in progress.
    fn request_progressed(&mut self);

    /// Non-body headers from one or more responses.
    fn response_headers_received(&mut self, headers: HeaderSet);

    /// The final response arrived.
    fn request_done(&mut self, code: ResponseCode);

    /// The peer acknowledged an Abort.
    fn request_aborted(&mut self);

    /// More body data is needed for a Put.
    fn body_data_required(&mut self) -> BodyChunk;

    /// Body data arrived in response to a Get.
    fn body_data_available(&mut self, data: &[u8]);

    fn link_error(&mut self);

    fn parse_error(&mut self);

    /// Response headers could not be interpreted.
    fn unknown_error(&mut self);

    fn disconnected(&mut self);
}

#[derive(Debug, Default)]
struct BodyPump {
    buffer: BytesMut,
    ended: bool,
}

impl BodyPump {
    /// Adds one body header to `packet` using at most `space` bytes.
    /// Returns true if it was the End-of-Body header.
    fn fill(
        &mut self,
        packet: &mut Packet,
        space: usize,
        sink: &mut impl ClientSink,
    ) -> Result<bool, SocketError> {
        if space <= 3 {
            return Ok(false);
        }
        let room = space - 3;

        while !self.ended && self.buffer.len() <= room {
            match sink.body_data_required() {
                BodyChunk::Data(data) if !data.is_empty() => self.buffer.extend_from_slice(&data),
                BodyChunk::Data(_) | BodyChunk::End => self.ended = true,
                BodyChunk::Error => return Err(SocketError::BodySource),
            }
        }

        if self.ended && self.buffer.len() <= room {
            let data = self.buffer.split().freeze();
            packet
                .headers
                .push(RawHeader::new(header_id::END_OF_BODY, data));
            Ok(true)
        } else {
            let data = self.buffer.split_to(room).freeze();
            packet.headers.push(RawHeader::new(header_id::BODY, data));
            Ok(false)
        }
    }
}

/// A request being sent.
#[derive(Debug)]
struct Outgoing {
    request: Request,
    opcode: u8,
    prefix: Bytes,
    first: bool,
    headers: VecDeque<RawHeader>,
    body: Option<BodyPump>,
    final_sent: bool,
    response_headers: Vec<RawHeader>,
}

impl Outgoing {
    fn build_packet(
        &mut self,
        mtu: usize,
        sink: &mut impl ClientSink,
    ) -> Result<Packet, SocketError> {
        let mut packet = Packet::new(self.opcode);
        let mut size = PACKET_HEADER_SIZE;
        if self.first {
            packet.prefix = self.prefix.clone();
            size += self.prefix.len();
            self.first = false;
        }

        while self
            .headers
            .front()
            .is_some_and(|h| size + h.encoded_len() <= mtu)
        {
            if let Some(header) = self.headers.pop_front() {
                size += header.encoded_len();
                packet.headers.push(header);
            }
        }

        let is_final = match self.body.as_mut() {
            Some(pump) if self.headers.is_empty() => pump.fill(&mut packet, mtu - size, sink)?,
            Some(_) => false,
            None => self.headers.is_empty(),
        };
        if is_final {
            packet.code |= opcode::FINAL_BIT;
            self.final_sent = true;
        }
        Ok(packet)
    }
}

#[derive(Debug)]
enum Phase {
    Idle,
    Active(Outgoing),
    /// An Abort was sent; waiting for its response.
    Aborting,
}

/// The client role of the packet engine.
pub struct ClientSocket<T: Transport> {
    socket: ObexSocket<T>,
    phase: Phase,
    abort_pending: bool,
}

impl<T: Transport> ClientSocket<T> {
    pub fn new(transport: T, config: SocketConfig) -> Self {
        Self {
            socket: ObexSocket::new(transport, config),
            phase: Phase::Idle,
            abort_pending: false,
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
        self.phase = Phase::Idle;
        self.abort_pending = false;
        self.socket.close();
    }

    /// Whether a request (or an Abort) is waiting for a response.
    pub fn is_busy(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    pub fn current_request(&self) -> Option<Request> {
        match &self.phase {
            Phase::Active(out) => Some(out.request),
            _ => None,
        }
    }

    /// Starts a request and sends its first packet.
    ///
    /// `non_header_data` is only used by SetPath (its flags); Connect
    /// parameters are filled in from the socket configuration.
    pub fn send_request(
        &mut self,
        request: Request,
        headers: Vec<RawHeader>,
        non_header_data: &[u8],
        sink: &mut impl ClientSink,
    ) -> Result<(), SocketError> {
        if !self.socket.is_open() {
            return Err(SocketError::NotOpen);
        }
        if self.is_busy() {
            return Err(SocketError::Busy);
        }

        let prefix = match request {
            Request::Connect => {
                Bytes::copy_from_slice(&ConnectParams::new(self.socket.local_mtu()).encode())
            }
            Request::SetPath => Bytes::copy_from_slice(non_header_data),
            _ => Bytes::new(),
        };

        let mtu = self.socket.peer_mtu() as usize;
        let base = PACKET_HEADER_SIZE + prefix.len();
        if let Some(h) = headers.iter().find(|h| base + h.encoded_len() > mtu) {
            return Err(SocketError::RequestTooLarge {
                size: base + h.encoded_len(),
                max: mtu,
            });
        }
        if request.fits_one_packet() {
            let size = base + headers.iter().map(RawHeader::encoded_len).sum::<usize>();
            if size > mtu {
                return Err(SocketError::RequestTooLarge { size, max: mtu });
            }
        }

        let mut out = Outgoing {
            request,
            opcode: request.opcode(),
            prefix,
            first: true,
            headers: headers.into(),
            body: (request == Request::Put).then(BodyPump::default),
            final_sent: false,
            response_headers: Vec::new(),
        };

        let packet = out.build_packet(mtu, sink)?;
        tracing::debug!("Starting {} request", request);
        self.socket.send(&packet)?;
        self.abort_pending = false;
        self.phase = Phase::Active(out);
        Ok(())
    }

    /// Requests that the current request be aborted. The Abort packet is
    /// sent once the response to the packet in flight arrives. Returns
    /// false if no request is in progress.
    pub fn abort_current_request(&mut self) -> bool {
        match self.phase {
            Phase::Active(_) => {
                self.abort_pending = true;
                true
            }
            _ => false,
        }
    }

    /// Reads available input and handles every complete response.
    pub fn process_input(&mut self, sink: &mut impl ClientSink) {
        let status = self.socket.read_available();
        if let ReadStatus::Failed(e) = &status {
            tracing::warn!("OBEX transport read failed: {}", e);
            self.fail_link(sink);
            return;
        }

        loop {
            match self.socket.next_raw() {
                Ok(Some(raw)) => self.handle_response(raw, sink),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Malformed OBEX response: {}", e);
                    self.socket.discard_input();
                    self.phase = Phase::Idle;
                    self.abort_pending = false;
                    sink.parse_error();
                    break;
                }
            }
        }

        if let ReadStatus::Closed = status {
            tracing::debug!("OBEX transport closed");
            self.phase = Phase::Idle;
            self.abort_pending = false;
            sink.disconnected();
        }
    }

    fn fail_link(&mut self, sink: &mut impl ClientSink) {
        self.phase = Phase::Idle;
        self.abort_pending = false;
        sink.link_error();
    }

    fn send_abort(&mut self, sink: &mut impl ClientSink) {
        self.abort_pending = false;
        match self.socket.send(&Packet::new(opcode::ABORT)) {
            Ok(()) => {
                tracing::debug!("Sent Abort");
                self.phase = Phase::Aborting;
            }
            Err(e) => {
                tracing::warn!("Failed to send Abort: {}", e);
                self.fail_link(sink);
            }
        }
    }

    fn handle_response(&mut self, raw: RawPacket, sink: &mut impl ClientSink) {
        let mut out = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => {
                tracing::warn!("Ignoring response {:#04x}: no request in progress", raw.code);
                return;
            }
            Phase::Aborting => {
                tracing::debug!("Abort acknowledged with {:#04x}", raw.code);
                sink.request_aborted();
                return;
            }
            Phase::Active(out) => out,
        };

        let prefix_len = if out.request == Request::Connect {
            CONNECT_PREFIX_SIZE
        } else {
            0
        };
        let packet = match raw.into_packet(prefix_len) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!("Malformed response to {}: {}", out.request, e);
                self.abort_pending = false;
                sink.parse_error();
                return;
            }
        };

        let code = ResponseCode::from_u8(packet.code);
        if code.is_continue() && self.abort_pending {
            self.send_abort(sink);
            return;
        }
        self.abort_pending = false;

        let connect_params = packet.connect_params();
        let mut body = Vec::new();
        for header in packet.headers {
            if header.is_body() {
                body.push(header.data);
            } else {
                out.response_headers.push(header);
            }
        }

        if code.is_continue() {
            if !body.is_empty() {
                if !Self::deliver_headers(&mut out, sink) {
                    return;
                }
                for chunk in body.iter().filter(|c| !c.is_empty()) {
                    sink.body_data_available(chunk);
                }
            }
            sink.request_progressed();

            let next = if out.final_sent {
                Ok(Packet::new(out.opcode | opcode::FINAL_BIT))
            } else {
                out.build_packet(self.socket.peer_mtu() as usize, sink)
            };
            match next {
                Ok(packet) => match self.socket.send(&packet) {
                    Ok(()) => self.phase = Phase::Active(out),
                    Err(e) => {
                        tracing::warn!("Failed to send {} packet: {}", out.request, e);
                        self.fail_link(sink);
                    }
                },
                Err(e) => {
                    tracing::warn!("Aborting {}: {}", out.request, e);
                    self.send_abort(sink);
                }
            }
            return;
        }

        match out.request {
            Request::Connect if code.is_success() => {
                if let Some(params) = connect_params {
                    self.socket.set_peer_mtu(params.max_packet_length);
                }
            }
            Request::Disconnect => self.socket.reset_peer_mtu(),
            _ => {}
        }

        if !Self::deliver_headers(&mut out, sink) {
            return;
        }
        for chunk in body.iter().filter(|c| !c.is_empty()) {
            sink.body_data_available(chunk);
        }
        tracing::debug!("{} finished with {}", out.request, code);
        sink.request_done(code);
    }

    fn deliver_headers(out: &mut Outgoing, sink: &mut impl ClientSink) -> bool {
        if out.response_headers.is_empty() {
            return true;
        }
        let raw = std::mem::take(&mut out.response_headers);
        match HeaderSet::read_headers(&raw) {
            Ok(headers) => {
                sink.response_headers_received(headers);
                true
            }
            Err(e) => {
                tracing::warn!("Unreadable response headers: {}", e);
                sink.unknown_error();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use obex_protocol::PacketDecoder;

    #[derive(Debug, PartialEq)]
    enum Event {
        Progress,
        Headers(HeaderSet),
        Done(ResponseCode),
        Aborted,
        Body(Vec<u8>),
        LinkError,
        ParseError,
        UnknownError,
        Disconnected,
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
        body: VecDeque<BodyChunk>,
    }

    impl ClientSink for Recorder {
        fn request_progressed(&mut self) {
            self.events.push(Event::Progress);
        }
        fn response_headers_received(&mut self, headers: HeaderSet) {
            self.events.push(Event::Headers(headers));
        }
        fn request_done(&mut self, code: ResponseCode) {
            self.events.push(Event::Done(code));
        }
        fn request_aborted(&mut self) {
            self.events.push(Event::Aborted);
        }
        fn body_data_required(&mut self) -> BodyChunk {
            self.body.pop_front().unwrap_or(BodyChunk::End)
        }
        fn body_data_available(&mut self, data: &[u8]) {
            self.events.push(Event::Body(data.to_vec()));
        }
        fn link_error(&mut self) {
            self.events.push(Event::LinkError);
        }
        fn parse_error(&mut self) {
            self.events.push(Event::ParseError);
        }
        fn unknown_error(&mut self) {
            self.events.push(Event::UnknownError);
        }
        fn disconnected(&mut self) {
            self.events.push(Event::Disconnected);
        }
    }

    fn setup() -> (ClientSocket<MemoryTransport>, MemoryTransport, Recorder) {
        let transport = MemoryTransport::new();
        let peer = transport.clone();
        (
            ClientSocket::new(transport, SocketConfig::new()),
            peer,
            Recorder::default(),
        )
    }

    fn sent(peer: &MemoryTransport) -> Vec<Packet> {
        let mut decoder = PacketDecoder::new();
        decoder.extend(&peer.take_outbound());
        let mut packets = Vec::new();
        while let Some(packet) = decoder.decode_request().unwrap() {
            packets.push(packet);
        }
        packets
    }

    fn respond(peer: &MemoryTransport, packet: Packet) {
        peer.push_inbound(&packet.encode(u16::MAX as usize).unwrap());
    }

    #[test]
    fn test_connect_negotiates_mtu() {
        let (mut client, peer, mut sink) = setup();
        client
            .send_request(Request::Connect, vec![], &[], &mut sink)
            .unwrap();

        let packets = sent(&peer);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].code, opcode::CONNECT);
        assert_eq!(
            packets[0].connect_params().unwrap().max_packet_length,
            client.socket().local_mtu()
        );

        respond(
            &peer,
            Packet::new(0xA0)
                .with_prefix(Bytes::copy_from_slice(&ConnectParams::new(1000).encode()))
                .with_headers(vec![RawHeader::four_byte(header_id::CONNECTION_ID, 5)]),
        );
        client.process_input(&mut sink);

        let mut expected = HeaderSet::new();
        expected.set_connection_id(5);
        assert_eq!(
            sink.events,
            vec![Event::Headers(expected), Event::Done(ResponseCode::SUCCESS)]
        );
        assert_eq!(client.socket().peer_mtu(), 1000);
        assert!(!client.is_busy());
    }

    #[test]
    fn test_put_streams_body_in_packets() {
        let (mut client, peer, mut sink) = setup();
        sink.body = VecDeque::from(vec![BodyChunk::Data(Bytes::from(vec![7u8; 600]))]);

        let headers = vec![RawHeader::new(header_id::NAME, vec![0, b'a', 0, 0])];
        client
            .send_request(Request::Put, headers, &[], &mut sink)
            .unwrap();

        let mut total = 0;
        let mut packets = sent(&peer);
        loop {
            assert_eq!(packets.len(), 1);
            let packet = &packets[0];
            assert!(packet.encode(255).is_ok());
            total += packet
                .headers
                .iter()
                .filter(|h| h.is_body())
                .map(|h| h.data.len())
                .sum::<usize>();
            if packet.is_final() {
                assert_eq!(packet.headers.last().unwrap().id, header_id::END_OF_BODY);
                break;
            }
            respond(&peer, Packet::new(0x90));
            client.process_input(&mut sink);
            packets = sent(&peer);
        }
        assert_eq!(total, 600);

        respond(&peer, Packet::new(0xA0));
        client.process_input(&mut sink);
        assert_eq!(sink.events.last(), Some(&Event::Done(ResponseCode::SUCCESS)));
        assert!(sink.events.iter().filter(|e| **e == Event::Progress).count() >= 2);
    }

    #[test]
    fn test_put_delete_has_no_body() {
        let (mut client, peer, mut sink) = setup();
        client
            .send_request(Request::PutDelete, vec![], &[], &mut sink)
            .unwrap();
        let packets = sent(&peer);
        assert_eq!(packets[0].code, opcode::PUT | opcode::FINAL_BIT);
        assert!(!packets[0].has_body());
    }

    #[test]
    fn test_get_collects_body_until_final() {
        let (mut client, peer, mut sink) = setup();
        client
            .send_request(Request::Get, vec![], &[], &mut sink)
            .unwrap();
        assert_eq!(sent(&peer)[0].code, opcode::GET | opcode::FINAL_BIT);

        respond(
            &peer,
            Packet::new(0x90).with_headers(vec![
                RawHeader::four_byte(header_id::LENGTH, 4),
                RawHeader::new(header_id::BODY, Bytes::from_static(b"ab")),
            ]),
        );
        client.process_input(&mut sink);
        assert_eq!(sent(&peer)[0].code, opcode::GET | opcode::FINAL_BIT);

        respond(
            &peer,
            Packet::new(0xA0).with_headers(vec![RawHeader::new(
                header_id::END_OF_BODY,
                Bytes::from_static(b"cd"),
            )]),
        );
        client.process_input(&mut sink);

        let mut length = HeaderSet::new();
        length.set_length(4);
        assert_eq!(
            sink.events,
            vec![
                Event::Headers(length),
                Event::Body(b"ab".to_vec()),
                Event::Progress,
                Event::Body(b"cd".to_vec()),
                Event::Done(ResponseCode::SUCCESS),
            ]
        );
    }

    #[test]
    fn test_abort_sent_at_next_response() {
        let (mut client, peer, mut sink) = setup();
        sink.body = VecDeque::from(vec![BodyChunk::Data(Bytes::from(vec![1u8; 1000]))]);
        client
            .send_request(Request::Put, vec![], &[], &mut sink)
            .unwrap();
        sent(&peer);

        assert!(client.abort_current_request());
        respond(&peer, Packet::new(0x90));
        client.process_input(&mut sink);
        assert_eq!(sent(&peer)[0].code, opcode::ABORT);
        assert!(client.is_busy());

        respond(&peer, Packet::new(0xA0));
        client.process_input(&mut sink);
        assert_eq!(sink.events, vec![Event::Aborted]);
        assert!(!client.abort_current_request());
    }

    #[test]
    fn test_body_source_error_aborts() {
        let (mut client, peer, mut sink) = setup();
        sink.body = VecDeque::from(vec![
            BodyChunk::Data(Bytes::from(vec![1u8; 300])),
            BodyChunk::Error,
        ]);
        client
            .send_request(Request::Put, vec![], &[], &mut sink)
            .unwrap();
        sent(&peer);

        respond(&peer, Packet::new(0x90));
        client.process_input(&mut sink);
        assert_eq!(sent(&peer)[0].code, opcode::ABORT);
    }

    #[test]
    fn test_oversized_single_packet_request() {
        let (mut client, _peer, mut sink) = setup();
        let headers = vec![
            RawHeader::new(header_id::TARGET, vec![0u8; 200]),
            RawHeader::new(header_id::WHO, vec![0u8; 200]),
        ];
        assert!(matches!(
            client.send_request(Request::Connect, headers, &[], &mut sink),
            Err(SocketError::RequestTooLarge { max: 255, .. })
        ));
        assert!(!client.is_busy());
    }

    #[test]
    fn test_busy_and_closed() {
        let (mut client, _peer, mut sink) = setup();
        client
            .send_request(Request::Disconnect, vec![], &[], &mut sink)
            .unwrap();
        assert!(matches!(
            client.send_request(Request::Get, vec![], &[], &mut sink),
            Err(SocketError::Busy)
        ));

        client.close();
        assert!(matches!(
            client.send_request(Request::Get, vec![], &[], &mut sink),
            Err(SocketError::NotOpen)
        ));
    }

    #[test]
    fn test_malformed_response_is_parse_error() {
        let (mut client, peer, mut sink) = setup();
        client
            .send_request(Request::Get, vec![], &[], &mut sink)
            .unwrap();
        peer.push_inbound(&[0xA0, 0x00, 0x01]);
        client.process_input(&mut sink);
        assert_eq!(sink.events, vec![Event::ParseError]);
        assert!(!client.is_busy());
    }

    #[test]
    fn test_peer_close_reports_disconnect() {
        let (mut client, mut peer, mut sink) = setup();
        peer.close();
        client.process_input(&mut sink);
        assert_eq!(sink.events, vec![Event::Disconnected]);
    }
}
