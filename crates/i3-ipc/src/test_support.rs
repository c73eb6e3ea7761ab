//! Helpers for playing the i3 side of a socket in tests

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::Frame;

/// Build a frame by hand, including type values outside the message table
pub(crate) fn raw_frame(message_type: u32, payload: &str) -> Vec<u8> {
    let mut buf = b"i3-ipc".to_vec();
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&message_type.to_le_bytes());
    buf.extend_from_slice(payload.as_bytes());
    buf
}

/// Event frame type for the given event index
pub(crate) fn event_kind(index: u32) -> u32 {
    Frame::EVENT_BIT | index
}

pub(crate) async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S) -> (u32, String) {
    let mut header = [0u8; 14];
    stream.read_exact(&mut header).await.unwrap();
    assert_eq!(&header[..6], b"i3-ipc", "client sent a frame with bad magic");
    let length = u32::from_le_bytes(header[6..10].try_into().unwrap());
    let kind = u32::from_le_bytes(header[10..14].try_into().unwrap());
    let mut payload = vec![0u8; length as usize];
    stream.read_exact(&mut payload).await.unwrap();
    (kind, String::from_utf8(payload).unwrap())
}

pub(crate) async fn write_frame<S: AsyncWrite + Unpin>(stream: &mut S, kind: u32, payload: &str) {
    stream.write_all(&raw_frame(kind, payload)).await.unwrap();
    stream.flush().await.unwrap();
}

/// Answer requests on one connection the way i3 would, until it closes
///
/// A subscribe gets a success ack followed by one `focus` event, state
/// queries get a one-element list, commands get `[{"success":true}]`.
pub(crate) async fn serve_like_i3<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S) {
    let mut header = [0u8; 14];
    while stream.read_exact(&mut header).await.is_ok() {
        let length = u32::from_le_bytes(header[6..10].try_into().unwrap());
        let kind = u32::from_le_bytes(header[10..14].try_into().unwrap());
        let mut payload = vec![0u8; length as usize];
        if stream.read_exact(&mut payload).await.is_err() {
            return;
        }
        match kind {
            0 => write_frame(&mut stream, 0, r#"[{"success":true}]"#).await,
            2 => {
                write_frame(&mut stream, 2, r#"{"success":true}"#).await;
                write_frame(
                    &mut stream,
                    event_kind(0),
                    r#"{"change":"focus","current":{"num":2}}"#,
                )
                .await;
            }
            other => write_frame(&mut stream, other, r#"[{"name":"1","num":1}]"#).await,
        }
    }
}
