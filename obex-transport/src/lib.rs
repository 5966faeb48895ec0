//! # obex-transport
//!
//! Packet engine for OBEX sessions.
//!
//! This crate provides:
//! - The [`Transport`] contract over a reliable byte stream, plus an
//!   in-memory implementation used by tests and the TCP daemon
//! - [`ObexSocket`], which frames packets over a transport and negotiates
//!   the maximum packet length
//! - The client and server packet state machines, which report progress
//!   through the [`ClientSink`] and [`ServerSink`] callback traits
//! - [`TaskQueue`], the explicit "run on a later turn" scheduler sessions
//!   use to avoid acting from inside a callback

pub mod client;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod server;
pub mod socket;
pub mod transport;

pub use client::{BodyChunk, ClientSink, ClientSocket};
pub use config::SocketConfig;
pub use error::SocketError;
pub use scheduler::{Scheduled, TaskQueue};
pub use server::{ServerSink, ServerSocket};
pub use socket::{ObexSocket, ReadStatus};
pub use transport::{MemoryTransport, Transport};
