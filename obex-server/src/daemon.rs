//! TCP front end for the Object Push service.
//!
//! Each accepted connection gets its own [`ServerSession`] running a
//! [`PushService`] over a [`MemoryTransport`]. The connection task moves
//! bytes between the socket and the transport and drives the session
//! after every read.

use crate::config::Config;
use crate::push::{DirectoryInbox, PushService, PushServiceEvent};
use crate::session::ServerSession;
use bytes::Bytes;
use obex_transport::{MemoryTransport, Transport};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

type PushSession = ServerSession<PushService<DirectoryInbox>, MemoryTransport>;

/// Daemon statistics.
#[derive(Debug, Default)]
pub struct DaemonStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub objects_received: AtomicU64,
    pub errors_total: AtomicU64,
}

/// Object Push daemon.
pub struct Daemon {
    config: Config,
    business_card: Option<Bytes>,
    stats: Arc<DaemonStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            business_card: None,
            stats: Arc::new(DaemonStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Sets the vCard served to clients asking for the default business card.
    pub fn with_business_card(mut self, vcard: Option<Bytes>) -> Self {
        self.business_card = vcard.filter(|card| !card.is_empty());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &Arc<DaemonStats> {
        &self.stats
    }

    /// Stops accepting connections and closes every open session.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&self) -> io::Result<()> {
        let listener = TcpListener::bind(self.config.network.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections accepted on `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        tracing::info!("OBEX daemon listening on {}", listener.local_addr()?);
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let active = self.stats.connections_active.load(Ordering::Relaxed);
                            if active >= self.config.network.max_connections as u64 {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                drop(stream);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let session = self.new_session();
                            let stats = self.stats.clone();
                            let mut shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(
                                    stream,
                                    addr,
                                    session,
                                    &stats,
                                    &mut shutdown,
                                )
                                .await
                                {
                                    tracing::debug!("[{}] Connection error: {}", addr, e);
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("OBEX daemon shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn new_session(&self) -> (PushSession, MemoryTransport) {
        let transport = MemoryTransport::new();
        let mut service = PushService::new(DirectoryInbox::from_config(&self.config.push));
        if let Some(card) = &self.business_card {
            service = service.with_business_card(card.clone());
        }
        let session = ServerSession::with_config(
            service,
            transport.clone(),
            self.config.socket.socket_config(),
        );
        (session, transport)
    }

    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        (mut session, transport): (PushSession, MemoryTransport),
        stats: &DaemonStats,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> io::Result<()> {
        tracing::info!("Client connected: {}", addr);
        let mut buf = vec![0u8; 8192];

        loop {
            tokio::select! {
                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::debug!("[{}] Connection closed by client", addr);
                            Self::drop_link(&mut session, &transport);
                            Self::report_events(addr, &mut session, stats);
                            return Ok(());
                        }
                        Ok(n) => {
                            transport.push_inbound(&buf[..n]);
                            session.process_input();
                            Self::report_events(addr, &mut session, stats);

                            let output = transport.take_outbound();
                            if !output.is_empty() {
                                stream.write_all(&output).await?;
                            }

                            if session.is_closed() {
                                tracing::debug!("[{}] Session closed", addr);
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            Self::drop_link(&mut session, &transport);
                            Self::report_events(addr, &mut session, stats);
                            return Err(e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Closing for shutdown", addr);
                    session.close();
                    return Ok(());
                }
            }
        }
    }

    /// Lets the session notice that the socket is gone.
    fn drop_link(session: &mut PushSession, transport: &MemoryTransport) {
        let mut handle = transport.clone();
        handle.close();
        session.process_input();
    }

    fn report_events(addr: SocketAddr, session: &mut PushSession, stats: &DaemonStats) {
        for event in session.handler_mut().take_events() {
            match event {
                PushServiceEvent::StateChanged(state) => {
                    tracing::debug!("[{}] Push service {}", addr, state);
                }
                PushServiceEvent::PutRequested(object) => {
                    tracing::info!(
                        "[{}] Receiving '{}' ({} bytes)",
                        addr,
                        object.name,
                        object.length
                    );
                }
                PushServiceEvent::BusinessCardRequested => {
                    tracing::info!("[{}] Business card requested", addr);
                }
                PushServiceEvent::DataTransferProgress { done, total } => {
                    tracing::trace!("[{}] {}/{} bytes", addr, done, total);
                }
                PushServiceEvent::RequestFinished { error, stored } => {
                    if let Some(path) = stored {
                        stats.objects_received.fetch_add(1, Ordering::Relaxed);
                        tracing::info!("[{}] Stored {}", addr, path.display());
                    } else if error {
                        stats.errors_total.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!("[{}] Request failed", addr);
                    }
                }
                PushServiceEvent::Done { error } => {
                    if error {
                        tracing::warn!("[{}] Session ended with an error", addr);
                    }
                }
            }
        }
    }
}
