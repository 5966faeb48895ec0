//! End-to-end client/server benchmarks over an in-memory transport.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use obex_client::{ClientSession, SharedBuffer};
use obex_protocol::{HeaderSet, ResponseCode};
use obex_server::{Capabilities, ServerContext, ServerHandler, ServerSession};
use obex_transport::{MemoryTransport, SocketConfig};

/// Accepts every Put and serves a fixed body on Get.
struct SinkHandler {
    received: usize,
    body: Bytes,
    offset: usize,
}

impl ServerHandler for SinkHandler {
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn connect(&mut self, _ctx: &mut ServerContext, _header: &HeaderSet) -> ResponseCode {
        ResponseCode::SUCCESS
    }

    fn put(&mut self, _ctx: &mut ServerContext, _header: &HeaderSet) -> ResponseCode {
        self.received = 0;
        ResponseCode::SUCCESS
    }

    fn get(&mut self, _ctx: &mut ServerContext, _header: &HeaderSet) -> ResponseCode {
        self.offset = 0;
        ResponseCode::SUCCESS
    }

    fn data_available(&mut self, _ctx: &mut ServerContext, data: &[u8]) -> ResponseCode {
        self.received += data.len();
        ResponseCode::SUCCESS
    }

    fn provide_data(&mut self, _ctx: &mut ServerContext) -> (ResponseCode, Bytes) {
        let end = self.body.len().min(self.offset + 4096);
        let chunk = self.body.slice(self.offset..end);
        self.offset = end;
        (ResponseCode::SUCCESS, chunk)
    }
}

struct TestSetup {
    client: ClientSession<MemoryTransport>,
    server: ServerSession<SinkHandler, MemoryTransport>,
}

impl TestSetup {
    fn new(mtu: u16, body_size: usize) -> Self {
        let (a, b) = MemoryTransport::pair();
        let config = SocketConfig::new().with_mtu(mtu);
        let handler = SinkHandler {
            received: 0,
            body: Bytes::from(vec![0x42u8; body_size]),
            offset: 0,
        };
        let mut setup = Self {
            client: ClientSession::with_config(a, config),
            server: ServerSession::with_config(handler, b, config),
        };
        setup.client.connect(HeaderSet::new());
        setup.run();
        setup
    }

    fn run(&mut self) {
        while !self.client.is_idle() {
            self.client.poll();
            self.server.process_input();
        }
        self.client.take_events();
    }
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_put");

    for mtu in [255u16, 4096, 32767] {
        let size = 256 * 1024;
        let mut setup = TestSetup::new(mtu, 0);
        let data = Bytes::from(vec![0x42u8; size]);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(mtu), &data, |b, data| {
            b.iter(|| {
                let mut header = HeaderSet::new();
                header.set_name("bench.bin");
                header.set_length(data.len() as u32);
                setup.client.put(header, data.clone());
                setup.run();
                black_box(setup.server.handler().received)
            });
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_get");

    for mtu in [255u16, 4096, 32767] {
        let size = 256 * 1024;
        let mut setup = TestSetup::new(mtu, size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::from_parameter(mtu), |b| {
            b.iter(|| {
                let destination = SharedBuffer::new();
                setup
                    .client
                    .get_into(HeaderSet::new(), Box::new(destination.clone()));
                setup.run();
                black_box(destination.len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_put, bench_get);
criterion_main!(benches);
