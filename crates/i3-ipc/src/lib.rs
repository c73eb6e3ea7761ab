//! Client for the i3 window manager IPC protocol
//!
//! i3 listens on a Unix domain socket and speaks a framed protocol: every
//! message is the magic string `i3-ipc`, a little-endian payload length, a
//! little-endian message type and a (usually JSON) payload.
//!
//! ## Architecture
//!
//! - [`FrameCodec`]: encodes and decodes frames
//! - [`Connection`]: one socket, request/reply and raw frame reads with a
//!   bounded receive timeout
//! - [`Subscription`]: background task delivering events of one category,
//!   together with a fresh state snapshot, to a callback
//! - [`command::resolve`]: turns an operation name and arguments into a
//!   request
//! - [`tree::filter`]: finds containers in the layout tree by their fields
//! - [`msg`] / [`command()`]: requests over a lazily opened, process-wide
//!   default connection
//!
//! ## Example
//!
//! ```ignore
//! let mut conn = Connection::connect(&ConnectionConfig::default()).await?;
//! conn.request("workspace", &["2"]).await?;
//! let tree = conn.get(MessageType::GetTree, "").await?;
//! ```

pub mod codec;
pub mod command;
mod connection;
mod error;
mod global;
mod socket;
mod subscription;
pub mod tree;
mod types;

#[cfg(test)]
mod test_support;

pub use codec::{Decoded, FrameCodec, Header, DEFAULT_MAGIC, DEFAULT_MAX_PAYLOAD};
pub use command::{resolve, resolve_with_criteria, success};
pub use connection::{
    Connection, ConnectionConfig, DEFAULT_CHUNK_SIZE, DEFAULT_REPLY_TIMEOUT, DEFAULT_TIMEOUT,
};
pub use error::{IpcError, Result};
pub use global::{
    close_default_connection, command, command_with_criteria, default_connection, msg,
    set_default_connection,
};
pub use socket::{get_socket_path, query_socket_path, socket_path_from_env, I3SOCK_ENV};
pub use subscription::{Notification, Subscription};
pub use types::{AsEventType, AsMessageType, EventType, Frame, MessageType, Payload};
