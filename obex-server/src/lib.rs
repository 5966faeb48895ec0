//! # obex-server
//!
//! Server side of OBEX.
//!
//! This crate provides:
//! - [`ServerSession`], which answers requests arriving on a transport
//! - The [`ServerHandler`] trait and its [`Capabilities`] descriptor
//! - Digest authentication in both directions
//! - [`PushService`], an Object Push handler storing objects in an [`Inbox`]
//! - [`Daemon`], a TCP front end for the push service, and its configuration

pub mod config;
pub mod daemon;
pub mod error;
pub mod handler;
pub mod push;
pub mod session;

pub use config::{Config, ConfigError, NetworkConfig, PushConfig, SocketSettings};
pub use daemon::{Daemon, DaemonStats};
pub use error::{ServerError, ServerErrorKind};
pub use handler::{Capabilities, ServerContext, ServerHandler};
pub use push::{
    DirectoryInbox, IncomingObject, Inbox, ObjectSink, PushService, PushServiceError,
    PushServiceEvent, PushServiceState,
};
pub use session::ServerSession;
