//! Request/reply channel over a single i3 IPC socket
//!
//! A `Connection` owns one stream and a read buffer. Frames may be split or
//! coalesced arbitrarily by the transport, so anything read past the end of
//! the current frame stays in the buffer for the next `receive()`.
//!
//! Each `receive()` is bounded by the receive timeout, however many socket
//! reads it takes. Running out of time is not an error: `receive()` simply
//! reports that no frame is available yet, and any bytes already read are
//! kept.
//!
//! i3 answers requests in order. The connection counts requests whose reply
//! has not been read yet, so a reply that turns up after `get()` gave up on
//! it is recognised and dropped instead of answering the next request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::codec::{Decoded, FrameCodec, DEFAULT_MAGIC, DEFAULT_MAX_PAYLOAD};
use crate::command;
use crate::error::{IpcError, Result};
use crate::socket::get_socket_path;
use crate::tree;
use crate::types::{AsEventType, AsMessageType, Frame, MessageType, Payload};

/// Default bound on a single socket read (500ms)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Default bound on waiting for the reply to a request (5 seconds)
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of bytes requested per socket read
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Settings used to open a [`Connection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Socket to connect to; resolved with [`get_socket_path`] when `None`
    pub socket_path: Option<PathBuf>,
    /// Bound on each socket read
    pub timeout: Duration,
    /// Bound on waiting for the reply in [`Connection::get`]
    pub reply_timeout: Duration,
    /// Bytes requested per read while the frame header is still unknown
    pub chunk_size: usize,
    /// Marker expected at the start of every frame
    pub magic: Vec<u8>,
    /// Largest payload length accepted from the wire
    pub max_payload: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            timeout: DEFAULT_TIMEOUT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            magic: DEFAULT_MAGIC.to_vec(),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ConnectionConfig {
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_magic(mut self, magic: impl Into<Vec<u8>>) -> Self {
        self.magic = magic.into();
        self
    }

    fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.magic.clone()).with_max_payload(self.max_payload)
    }
}

/// One connection to i3
///
/// Requests are strictly sequential: `get()` sends a frame and waits for its
/// reply before anything else can use the connection. Callers that need
/// concurrent requests open one `Connection` each.
///
/// # Example
///
/// ```ignore
/// let mut conn = Connection::connect(&ConnectionConfig::default()).await?;
/// let workspaces = conn.get(MessageType::GetWorkspaces, "").await?;
/// conn.close().await?;
/// ```
#[derive(Debug)]
pub struct Connection<S = UnixStream> {
    stream: S,
    /// Bytes read from the socket but not yet returned as a frame
    buffer: Vec<u8>,
    codec: FrameCodec,
    timeout: Duration,
    reply_timeout: Duration,
    chunk_size: usize,
    socket_path: Option<PathBuf>,
    /// Requests sent whose reply has not been read yet
    outstanding: usize,
}

impl Connection<UnixStream> {
    /// Connect to the i3 socket described by `config`
    ///
    /// # Errors
    ///
    /// Returns `IpcError::SocketPathUnavailable` if no path is configured and
    /// none can be discovered.
    /// Returns `IpcError::ConnectionFailed` if the connection fails.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let socket_path = match &config.socket_path {
            Some(path) => path.clone(),
            None => get_socket_path().await?,
        };

        let stream = UnixStream::connect(&socket_path)
            .await
            .map_err(|e| IpcError::ConnectionFailed {
                path: socket_path.clone(),
                source: e,
            })?;

        debug!(path = %socket_path.display(), "Connected to i3 IPC socket");

        let mut connection = Self::from_stream(stream, config);
        connection.socket_path = Some(socket_path);
        Ok(connection)
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream
    pub fn from_stream(stream: S, config: &ConnectionConfig) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            codec: config.codec(),
            timeout: config.timeout,
            reply_timeout: config.reply_timeout,
            chunk_size: config.chunk_size.max(1),
            socket_path: None,
            outstanding: 0,
        }
    }

    pub fn socket_path(&self) -> Option<&Path> {
        self.socket_path.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Requests still waiting for their reply, including abandoned ones
    pub fn pending_replies(&self) -> usize {
        self.outstanding
    }

    /// Number of bytes read ahead of the frame boundary
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Send one frame
    ///
    /// The message type is checked before anything touches the socket.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::UnsupportedMessageType` for names outside the table.
    /// Returns `IpcError::SendFailed` if writing to the socket fails.
    pub async fn send(&mut self, message_type: impl AsMessageType, payload: &str) -> Result<()> {
        let message_type = message_type.to_message_type()?;
        let bytes = self.codec.encode(message_type, payload)?;

        self.stream
            .write_all(&bytes)
            .await
            .map_err(IpcError::SendFailed)?;
        self.stream.flush().await.map_err(IpcError::SendFailed)?;
        self.outstanding += 1;

        debug!(%message_type, bytes = bytes.len(), "Sent frame");
        Ok(())
    }

    /// Receive the payload of the next frame
    ///
    /// Returns `Ok(None)` when the receive timeout runs out first. The
    /// timeout covers the whole call, not each socket read.
    pub async fn receive(&mut self) -> Result<Option<Payload>> {
        Ok(self.receive_frame().await?.map(|frame| frame.payload))
    }

    /// Receive the next frame, including its type field
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionClosed` on EOF.
    /// Returns `IpcError::ReceiveFailed` if reading from the socket fails.
    /// Returns `IpcError::MalformedFrame` for a frame that breaks the
    /// protocol; the offending bytes are dropped so the next call can
    /// pick up at the following frame.
    pub async fn receive_frame(&mut self) -> Result<Option<Frame>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let wanted = match self.codec.decode_frame(&self.buffer) {
                Ok(Decoded::Complete { frame, consumed }) => {
                    self.buffer.drain(..consumed);
                    if !frame.is_event() {
                        self.outstanding = self.outstanding.saturating_sub(1);
                    }
                    debug!(
                        message_type = frame.message_type,
                        bytes = consumed,
                        buffered = self.buffer.len(),
                        "Received frame"
                    );
                    return Ok(Some(frame));
                }
                // Once the header is known, read only what the frame still lacks
                Ok(Decoded::Incomplete { needed }) if self.header_known() => {
                    needed.min(self.chunk_size)
                }
                Ok(Decoded::Incomplete { .. }) => self.chunk_size,
                Err(e) => {
                    self.discard_malformed();
                    return Err(e);
                }
            };

            if !self.fill(wanted, deadline).await? {
                return Ok(None);
            }
        }
    }

    /// Wait up to one receive timeout for the reply to the last request
    ///
    /// Late replies to requests that were given up on arrive first and are
    /// dropped, as are event frames and replies of another message type.
    /// Returns `Ok(None)` when the timeout runs out before the reply.
    ///
    /// [`get`](Self::get) is built on this; it is public for callers that
    /// want to check something of their own between timeouts.
    pub async fn receive_reply(&mut self, message_type: impl AsMessageType) -> Result<Option<Payload>> {
        let message_type = message_type.to_message_type()?;
        loop {
            let frame = match self.receive_frame().await? {
                Some(frame) => frame,
                None => return Ok(None),
            };

            if frame.is_event() {
                debug!(
                    message_type = frame.message_type,
                    "Dropping event while waiting for a reply"
                );
                continue;
            }
            if self.outstanding > 0 {
                debug!(
                    message_type = frame.message_type,
                    outstanding = self.outstanding,
                    "Dropping late reply to an abandoned request"
                );
                continue;
            }
            if frame.message_type != message_type.index() {
                warn!(
                    expected = %message_type,
                    received = frame.message_type,
                    "Dropping reply of unexpected type"
                );
                // Not the answer to our request, which is still due
                self.outstanding += 1;
                continue;
            }

            return Ok(Some(frame.payload));
        }
    }

    /// Send a request and wait for its reply
    ///
    /// Receive timeouts while waiting are retried until `reply_timeout` has
    /// passed in total. A reply that arrives after that is dropped by the
    /// next request on this connection.
    ///
    /// # Errors
    ///
    /// Returns any error from `send()` or `receive()`.
    /// Returns `IpcError::ReplyTimeout` if no reply arrives in time.
    pub async fn get(&mut self, message_type: impl AsMessageType, payload: &str) -> Result<Payload> {
        let message_type = message_type.to_message_type()?;
        self.send(message_type, payload).await?;

        let started = Instant::now();
        loop {
            if let Some(reply) = self.receive_reply(message_type).await? {
                return Ok(reply);
            }
            if started.elapsed() >= self.reply_timeout {
                warn!(
                    %message_type,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "No reply from i3 within the reply timeout"
                );
                return Err(IpcError::ReplyTimeout {
                    after: self.reply_timeout,
                });
            }
        }
    }

    /// Subscribe this connection to an event category
    ///
    /// Sends `["<event_type>"]` or `["<event_type>", "<event>"]` and returns
    /// i3's acknowledgment. Events start arriving on this connection
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::UnsupportedEventType` before any I/O if the event
    /// type is unknown, or any error from `get()`.
    pub async fn subscribe(&mut self, event_type: impl AsEventType, event: Option<&str>) -> Result<Payload> {
        let event_type = event_type.to_event_type()?;
        let request = match event {
            Some(event) => json!([event_type.name(), event]),
            None => json!([event_type.name()]),
        };
        let payload = serde_json::to_string(&request).map_err(IpcError::SerializeFailed)?;

        debug!(%event_type, event = ?event, "Subscribing");
        self.get(MessageType::Subscribe, &payload).await
    }

    /// Run a named operation, see [`command::resolve`]
    ///
    /// ```ignore
    /// conn.request("workspace", &["2"]).await?;       // command "workspace 2"
    /// conn.request("get_outputs", &[] as &[&str]).await?;
    /// ```
    pub async fn request<A: AsRef<str>>(&mut self, name: &str, args: &[A]) -> Result<Payload> {
        let (message_type, payload) = command::resolve(name, args);
        self.get(message_type, &payload).await
    }

    /// Run a named command on the containers matching `criteria`
    ///
    /// ```ignore
    /// conn.request_with_criteria("focus", &[("con_id", "94")], &[] as &[&str]).await?;
    /// ```
    pub async fn request_with_criteria<K, V, A>(
        &mut self,
        name: &str,
        criteria: &[(K, V)],
        args: &[A],
    ) -> Result<Payload>
    where
        K: AsRef<str>,
        V: AsRef<str>,
        A: AsRef<str>,
    {
        let (message_type, payload) = command::resolve_with_criteria(name, criteria, args);
        self.get(message_type, &payload).await
    }

    /// Fetch the layout tree and return the nodes matching `criteria`
    ///
    /// See [`tree::filter`].
    ///
    /// # Errors
    ///
    /// Returns any error from `get()`.
    /// Returns `IpcError::UnexpectedReply` if the tree is not JSON.
    pub async fn filter_tree(&mut self, criteria: &[(&str, Value)]) -> Result<Vec<Value>> {
        let reply = self.get(MessageType::GetTree, "").await?;
        let tree = match reply {
            Payload::Json(tree) => tree,
            Payload::Text(text) => {
                return Err(IpcError::UnexpectedReply {
                    request: MessageType::GetTree.to_string(),
                    reply: text,
                })
            }
        };
        Ok(tree::filter(&tree, criteria).into_iter().cloned().collect())
    }

    /// Shut the connection down
    pub async fn close(mut self) -> Result<()> {
        match self.stream.shutdown().await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
            Err(e) => return Err(IpcError::SendFailed(e)),
        }
        if !self.buffer.is_empty() {
            debug!(
                buffered = self.buffer.len(),
                "Closing connection with unread bytes"
            );
        }
        debug!("Connection closed");
        Ok(())
    }

    fn header_known(&self) -> bool {
        self.codec.decode_header(&self.buffer).is_some()
    }

    /// Read up to `wanted` bytes into the buffer
    ///
    /// Returns `false` if `deadline` passed first.
    async fn fill(&mut self, wanted: usize, deadline: Instant) -> Result<bool> {
        let start = self.buffer.len();
        self.buffer.resize(start + wanted, 0);

        let read = timeout_at(deadline, self.stream.read(&mut self.buffer[start..])).await;
        match read {
            Err(_elapsed) => {
                self.buffer.truncate(start);
                Ok(false)
            }
            Ok(Ok(0)) => {
                self.buffer.truncate(start);
                Err(IpcError::ConnectionClosed)
            }
            Ok(Ok(n)) => {
                self.buffer.truncate(start + n);
                Ok(true)
            }
            Ok(Err(e)) => {
                self.buffer.truncate(start);
                Err(IpcError::ReceiveFailed(e))
            }
        }
    }

    /// Drop bytes up to the next magic marker after a malformed frame
    fn discard_malformed(&mut self) {
        let magic = self.codec.magic();
        let next = if magic.is_empty() {
            None
        } else {
            self.buffer
                .windows(magic.len())
                .skip(1)
                .position(|window| window == magic)
                .map(|pos| pos + 1)
        };

        let dropped = next.unwrap_or(self.buffer.len());
        self.buffer.drain(..dropped);
        warn!(dropped, "Discarded malformed frame bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{event_kind, raw_frame, read_frame, serve_like_i3, write_frame};
    use serde_json::json;
    use tokio::io::{duplex, DuplexStream};
    use tokio::time::sleep;

    fn test_config() -> ConnectionConfig {
        ConnectionConfig::default()
            .with_timeout(Duration::from_millis(200))
            .with_reply_timeout(Duration::from_secs(2))
    }

    fn pair(config: &ConnectionConfig) -> (Connection<DuplexStream>, DuplexStream) {
        let (client, server) = duplex(64 * 1024);
        (Connection::from_stream(client, config), server)
    }

    #[tokio::test]
    async fn test_send_writes_one_frame() {
        let (mut conn, mut server) = pair(&test_config());

        conn.send(MessageType::Command, "workspace 2").await.unwrap();

        let (kind, payload) = read_frame(&mut server).await;
        assert_eq!(kind, 0);
        assert_eq!(payload, "workspace 2");
    }

    #[tokio::test]
    async fn test_send_accepts_type_names() {
        let (mut conn, mut server) = pair(&test_config());

        conn.send("get_tree", "").await.unwrap();
        conn.send("5", "").await.unwrap();

        assert_eq!(read_frame(&mut server).await.0, 4);
        assert_eq!(read_frame(&mut server).await.0, 5);
    }

    #[tokio::test]
    async fn test_unsupported_type_writes_nothing() {
        let (mut conn, mut server) = pair(&test_config());

        let err = conn.send("not_a_type", "").await.unwrap_err();
        assert!(
            matches!(err, IpcError::UnsupportedMessageType(ref name) if name == "not_a_type"),
            "Expected UnsupportedMessageType, got: {:?}",
            err
        );

        drop(conn);
        let mut written = Vec::new();
        server.read_to_end(&mut written).await.unwrap();
        assert!(written.is_empty(), "No bytes should reach the socket");
    }

    #[tokio::test]
    async fn test_receive_single_read() {
        let (mut conn, mut server) = pair(&test_config());
        write_frame(&mut server, 4, r#"{"id":1,"nodes":[]}"#).await;

        let payload = conn.receive().await.unwrap().unwrap();
        assert_eq!(payload, Payload::Json(json!({"id": 1, "nodes": []})));
        assert_eq!(conn.buffered(), 0);
    }

    #[tokio::test]
    async fn test_reassembles_frame_split_at_any_offset() {
        let bytes = raw_frame(1, r#"[{"num":1,"name":"1: wéb"}]"#);
        let expected = Payload::Json(json!([{"num": 1, "name": "1: wéb"}]));

        for split in 1..bytes.len() {
            let (mut conn, mut server) = pair(&test_config());
            let (head, tail) = bytes.split_at(split);
            let tail = tail.to_vec();

            server.write_all(head).await.unwrap();
            let writer = tokio::spawn(async move {
                sleep(Duration::from_millis(5)).await;
                server.write_all(&tail).await.unwrap();
                server
            });

            let payload = conn.receive().await.unwrap();
            assert_eq!(payload, Some(expected.clone()), "split at {}", split);
            let _server = writer.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_reassembles_with_small_chunks() {
        let config = test_config().with_chunk_size(3);
        let (mut conn, mut server) = pair(&config);
        let payload = "x".repeat(100);
        write_frame(&mut server, 0, &payload).await;

        let received = conn.receive().await.unwrap().unwrap();
        assert_eq!(received, Payload::Text(payload));
    }

    #[tokio::test]
    async fn test_coalesced_frames_are_returned_in_order() {
        let (mut conn, mut server) = pair(&test_config());
        let mut bytes = raw_frame(3, r#"[{"name":"eDP-1"}]"#);
        bytes.extend(raw_frame(5, r#"["mark"]"#));
        server.write_all(&bytes).await.unwrap();

        let first = conn.receive_frame().await.unwrap().unwrap();
        assert_eq!(first.message_type, 3);
        assert!(conn.buffered() > 0);

        let second = conn.receive_frame().await.unwrap().unwrap();
        assert_eq!(second.message_type, 5);
        assert_eq!(second.payload, Payload::Json(json!(["mark"])));
        assert_eq!(conn.buffered(), 0);
    }

    #[tokio::test]
    async fn test_idle_receive_times_out_without_error() {
        let config = test_config().with_timeout(Duration::from_millis(100));
        let (mut conn, _server) = pair(&config);

        let started = Instant::now();
        let result = conn.receive().await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Ok(None)), "Expected Ok(None), got {:?}", result);
        assert!(elapsed >= Duration::from_millis(90), "returned too early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(1), "returned too late: {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_timeout_mid_frame_keeps_partial_bytes() {
        let config = test_config().with_timeout(Duration::from_millis(50));
        let (mut conn, mut server) = pair(&config);
        let bytes = raw_frame(4, r#"{"nodes":[]}"#);

        server.write_all(&bytes[..10]).await.unwrap();
        assert!(conn.receive().await.unwrap().is_none());
        assert_eq!(conn.buffered(), 10);

        server.write_all(&bytes[10..]).await.unwrap();
        let payload = conn.receive().await.unwrap().unwrap();
        assert_eq!(payload, Payload::Json(json!({"nodes": []})));
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let (mut conn, server) = pair(&test_config());
        drop(server);

        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, IpcError::ConnectionClosed));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let (mut conn, mut server) = pair(&test_config());
        let mut bytes = raw_frame(0, "{}");
        bytes[..6].copy_from_slice(b"xx-ipc");
        bytes.extend(raw_frame(4, r#"{"ok":true}"#));
        server.write_all(&bytes).await.unwrap();

        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, IpcError::MalformedFrame { .. }));
        assert!(!err.is_fatal());

        let payload = conn.receive().await.unwrap().unwrap();
        assert_eq!(payload, Payload::Json(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_get_round_trip() {
        let (mut conn, server) = pair(&test_config());
        tokio::spawn(serve_like_i3(server));

        let reply = conn.get(MessageType::GetWorkspaces, "").await.unwrap();
        assert_eq!(reply, Payload::Json(json!([{"name": "1", "num": 1}])));
    }

    #[tokio::test]
    async fn test_get_waits_past_receive_timeout() {
        let config = test_config().with_timeout(Duration::from_millis(30));
        let (mut conn, mut server) = pair(&config);

        tokio::spawn(async move {
            let (kind, _) = read_frame(&mut server).await;
            sleep(Duration::from_millis(150)).await;
            write_frame(&mut server, kind, r#"{"late":true}"#).await;
            server
        });

        let reply = conn.get(MessageType::GetBarConfig, "").await.unwrap();
        assert_eq!(reply.get("late"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_get_gives_up_after_reply_timeout() {
        let config = test_config()
            .with_timeout(Duration::from_millis(20))
            .with_reply_timeout(Duration::from_millis(100));
        let (mut conn, _server) = pair(&config);

        let err = conn.get(MessageType::GetTree, "").await.unwrap_err();
        assert!(matches!(err, IpcError::ReplyTimeout { .. }));
    }

    #[tokio::test]
    async fn test_late_reply_is_not_taken_for_the_next_one() {
        let config = test_config()
            .with_timeout(Duration::from_millis(20))
            .with_reply_timeout(Duration::from_millis(100));
        let (mut conn, mut server) = pair(&config);

        let server_task = tokio::spawn(async move {
            let (kind, _) = read_frame(&mut server).await;
            sleep(Duration::from_millis(200)).await;
            write_frame(&mut server, kind, r#"{"reply":"first"}"#).await;
            let (kind, _) = read_frame(&mut server).await;
            write_frame(&mut server, kind, r#"{"reply":"second"}"#).await;
            server
        });

        let err = conn.get(MessageType::GetWorkspaces, "").await.unwrap_err();
        assert!(matches!(err, IpcError::ReplyTimeout { .. }));
        assert_eq!(conn.pending_replies(), 1);

        conn.set_timeout(Duration::from_millis(200));
        let reply = conn.get(MessageType::GetWorkspaces, "").await.unwrap();
        assert_eq!(reply.get("reply"), Some(&json!("second")));
        assert_eq!(conn.pending_replies(), 0);

        let _server = server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_skips_events_and_foreign_replies() {
        let (mut conn, mut server) = pair(&test_config());

        tokio::spawn(async move {
            let (kind, _) = read_frame(&mut server).await;
            write_frame(&mut server, event_kind(0), r#"{"change":"focus"}"#).await;
            write_frame(&mut server, 3, r#"[{"name":"eDP-1"}]"#).await;
            write_frame(&mut server, kind, r#"["mark"]"#).await;
            server
        });

        let reply = conn.get(MessageType::GetMarks, "").await.unwrap();
        assert_eq!(reply, Payload::Json(json!(["mark"])));
        assert_eq!(conn.pending_replies(), 0);
    }

    #[tokio::test]
    async fn test_receive_is_bounded_while_frame_trickles_in() {
        let config = test_config().with_timeout(Duration::from_millis(100));
        let (mut conn, mut server) = pair(&config);
        let bytes = raw_frame(0, &"x".repeat(20));

        let writer = tokio::spawn(async move {
            for byte in bytes {
                server.write_all(&[byte]).await.unwrap();
                sleep(Duration::from_millis(30)).await;
            }
            server
        });

        let started = Instant::now();
        assert!(conn.receive().await.unwrap().is_none());
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(250), "receive took {:?}", elapsed);
        assert!(conn.buffered() > 0);

        let payload = loop {
            assert!(started.elapsed() < Duration::from_secs(5), "frame never completed");
            if let Some(payload) = conn.receive().await.unwrap() {
                break payload;
            }
        };
        assert_eq!(payload, Payload::Text("x".repeat(20)));
        let _server = writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_with_criteria() {
        let (mut conn, mut server) = pair(&test_config());

        let server_task = tokio::spawn(async move {
            let request = read_frame(&mut server).await;
            write_frame(&mut server, 0, r#"[{"success":true}]"#).await;
            request
        });

        let reply = conn
            .request_with_criteria::<_, _, &str>("focus", &[("con_id", "94")], &[])
            .await
            .unwrap();
        assert_eq!(command::success(&reply), Some(true));
        assert_eq!(
            server_task.await.unwrap(),
            (0, r#"[con_id="94"] focus"#.to_string())
        );
    }

    #[tokio::test]
    async fn test_filter_tree() {
        let (mut conn, mut server) = pair(&test_config());

        tokio::spawn(async move {
            let (kind, _) = read_frame(&mut server).await;
            assert_eq!(kind, MessageType::GetTree.index());
            let tree = json!({
                "id": 1,
                "nodes": [
                    {"id": 2, "focused": true, "nodes": []},
                    {"id": 3, "focused": false, "nodes": []}
                ]
            });
            write_frame(&mut server, kind, &tree.to_string()).await;
            let (kind, _) = read_frame(&mut server).await;
            write_frame(&mut server, kind, "not a tree").await;
            server
        });

        let windows = conn
            .filter_tree(&[("nodes", json!([])), ("focused", json!(true))])
            .await
            .unwrap();
        assert_eq!(windows, vec![json!({"id": 2, "focused": true, "nodes": []})]);

        let err = conn.filter_tree(&[]).await.unwrap_err();
        assert!(matches!(err, IpcError::UnexpectedReply { .. }));
    }

    #[tokio::test]
    async fn test_subscribe_payloads() {
        let (mut conn, mut server) = pair(&test_config());

        let server_task = tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..2 {
                let (kind, payload) = read_frame(&mut server).await;
                seen.push((kind, payload));
                write_frame(&mut server, 2, r#"{"success":true}"#).await;
            }
            seen
        });

        let ack = conn.subscribe("workspace", Some("focus")).await.unwrap();
        assert_eq!(ack.get("success"), Some(&json!(true)));
        conn.subscribe(crate::EventType::Output, None).await.unwrap();

        let seen = server_task.await.unwrap();
        assert_eq!(seen[0], (2, r#"["workspace","focus"]"#.to_string()));
        assert_eq!(seen[1], (2, r#"["output"]"#.to_string()));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_unknown_event_type() {
        let (mut conn, mut server) = pair(&test_config());

        let err = conn.subscribe("window", None).await.unwrap_err();
        assert!(matches!(err, IpcError::UnsupportedEventType(_)));

        drop(conn);
        let mut written = Vec::new();
        server.read_to_end(&mut written).await.unwrap();
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn test_request_resolves_command_names() {
        let (mut conn, mut server) = pair(&test_config());

        let server_task = tokio::spawn(async move {
            let first = read_frame(&mut server).await;
            write_frame(&mut server, 0, r#"[{"success":true}]"#).await;
            let second = read_frame(&mut server).await;
            write_frame(&mut server, 3, "[]").await;
            (first, second)
        });

        conn.request("move__container", &["to", "workspace", "3"])
            .await
            .unwrap();
        conn.request::<&str>("get_outputs", &[]).await.unwrap();

        let (first, second) = server_task.await.unwrap();
        assert_eq!(first, (0, "move container to workspace 3".to_string()));
        assert_eq!(second, (3, String::new()));
    }

    #[tokio::test]
    async fn test_event_frames_are_received_as_is() {
        let (mut conn, mut server) = pair(&test_config());
        write_frame(&mut server, event_kind(1), r#"{"change":"unspecified"}"#).await;

        let frame = conn.receive_frame().await.unwrap().unwrap();
        assert!(frame.is_event());
        assert_eq!(frame.payload.change(), Some("unspecified"));
    }

    #[tokio::test]
    async fn test_connect_over_unix_socket() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let socket_path = dir.path().join("ipc.sock");
        let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_like_i3(stream).await;
        });

        let config = test_config().with_socket_path(&socket_path);
        let mut conn = Connection::connect(&config).await.unwrap();
        assert_eq!(conn.socket_path(), Some(socket_path.as_path()));

        let reply = conn.get("command", "nop").await.unwrap();
        assert_eq!(command::success(&reply), Some(true));
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_missing_socket_fails() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let socket_path = dir.path().join("missing.sock");

        let err = Connection::connect(&test_config().with_socket_path(&socket_path))
            .await
            .unwrap_err();
        match &err {
            IpcError::ConnectionFailed { path, .. } => assert_eq!(path, &socket_path),
            other => panic!("Expected ConnectionFailed error, got: {:?}", other),
        }
        assert!(err.to_string().contains("Failed to connect"));
    }
}
