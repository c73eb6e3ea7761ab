//! Error types for i3 IPC operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when communicating with i3
#[derive(Debug, Error)]
pub enum IpcError {
    /// The message type is not part of the known message table
    #[error("Unsupported message type: {0}")]
    UnsupportedMessageType(String),

    /// The event type is not one of the supported event categories
    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),

    /// Neither `$I3SOCK` nor `i3 --get-socketpath` produced a socket path
    #[error("Couldn't get i3 socket path ({reason}) - is i3 running?")]
    SocketPathUnavailable { reason: String },

    /// Failed to connect to the i3 socket
    #[error("Failed to connect to i3 socket at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a frame to the socket
    #[error("Failed to send message to i3: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Failed to read from the socket
    #[error("Failed to receive message from i3: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The peer closed the socket
    #[error("Connection to i3 closed unexpectedly")]
    ConnectionClosed,

    /// No reply arrived for a request
    #[error("No reply from i3 after {after:?}")]
    ReplyTimeout { after: std::time::Duration },

    /// A frame header did not follow the protocol
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// Failed to serialize a request payload
    #[error("Failed to serialize payload: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// A reply did not have the shape the request calls for
    #[error("Unexpected reply to {request}: {reply}")]
    UnexpectedReply { request: String, reply: String },

    /// i3 answered the subscribe request with `success: false`
    #[error("i3 rejected subscription: {reply}")]
    SubscribeRejected { reply: String },
}

impl IpcError {
    /// Whether the error means the underlying socket is no longer usable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IpcError::ConnectionClosed | IpcError::ReceiveFailed(_) | IpcError::SendFailed(_)
        )
    }
}

pub type Result<T, E = IpcError> = std::result::Result<T, E>;
