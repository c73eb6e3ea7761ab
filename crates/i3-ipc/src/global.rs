//! Process-wide default connection
//!
//! Callers that don't want to manage a [`Connection`] themselves can go
//! through [`msg`] and [`command`], which share one connection. It is opened
//! with the default settings on first use, can be replaced with
//! [`set_default_connection`] and is torn down with
//! [`close_default_connection`]; the next use after that reconnects.
//!
//! The shared connection sits behind an async mutex, so concurrent callers
//! take turns rather than interleaving frames. Code that wants requests in
//! parallel should open its own connections.

use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::debug;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::{IpcError, Result};
use crate::types::{AsMessageType, Payload};

static DEFAULT_CONNECTION: Mutex<Option<Connection>> = Mutex::const_new(None);

/// Lock the default connection, connecting first if needed
///
/// The connection stays locked for as long as the guard is held.
pub async fn default_connection() -> Result<MappedMutexGuard<'static, Connection>> {
    let mut guard = DEFAULT_CONNECTION.lock().await;
    if guard.is_none() {
        debug!("Opening default connection");
        *guard = Some(Connection::connect(&ConnectionConfig::default()).await?);
    }
    MutexGuard::try_map(guard, Option::as_mut).map_err(|_| IpcError::ConnectionClosed)
}

/// Replace the default connection, returning the previous one
pub async fn set_default_connection(connection: Connection) -> Option<Connection> {
    DEFAULT_CONNECTION.lock().await.replace(connection)
}

/// Close the default connection if one is open
pub async fn close_default_connection() -> Result<()> {
    let previous = DEFAULT_CONNECTION.lock().await.take();
    match previous {
        Some(connection) => connection.close().await,
        None => Ok(()),
    }
}

/// Send a request over the default connection and wait for the reply
pub async fn msg(message_type: impl AsMessageType, payload: &str) -> Result<Payload> {
    let message_type = message_type.to_message_type()?;
    default_connection().await?.get(message_type, payload).await
}

/// Run a named operation over the default connection
///
/// See [`resolve`](crate::command::resolve) for how names map to requests.
pub async fn command<A: AsRef<str>>(name: &str, args: &[A]) -> Result<Payload> {
    default_connection().await?.request(name, args).await
}

/// Run a named command on the containers matching `criteria`, over the
/// default connection
pub async fn command_with_criteria<K, V, A>(
    name: &str,
    criteria: &[(K, V)],
    args: &[A],
) -> Result<Payload>
where
    K: AsRef<str>,
    V: AsRef<str>,
    A: AsRef<str>,
{
    default_connection()
        .await?
        .request_with_criteria(name, criteria, args)
        .await
}
