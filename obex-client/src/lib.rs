//! # obex-client
//!
//! Client library for OBEX.
//!
//! This crate provides:
//! - [`ClientSession`], a queue of requests run one at a time over any
//!   [`obex_transport::Transport`]
//! - Put bodies from memory or a [`BodyStream`], Get bodies into a stream
//!   or the session's own buffer
//! - Digest authentication in both directions
//! - [`PushClient`] for the Object Push profile

pub mod command;
pub mod error;
pub mod push;
pub mod session;

#[cfg(test)]
mod testing;

pub use command::{BodyStream, CommandId, OpenMode, SharedBuffer};
pub use error::{ClientError, ClientErrorKind};
pub use push::{ObjectInfo, PushClient, PushCommand, PushError, PushEvent};
pub use session::{ClientAuthenticator, ClientEvent, ClientSession, Credentials};
