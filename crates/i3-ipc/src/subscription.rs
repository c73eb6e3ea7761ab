//! Background delivery of i3 events
//!
//! A `Subscription` owns two connections. The first is subscribed to an
//! event category and only ever carries change notifications; the second is
//! used to fetch the full state after each matching notification, since the
//! notifications alone do not carry it.
//!
//! ## Lifecycle
//!
//! ```text
//! Created --(subscribe ack)--> Running --(close / stream lost)--> Stopped
//! ```
//!
//! The subscribe handshake happens before the listener task is spawned, so
//! setup errors are returned to the caller. Stopping is cooperative: the task
//! checks its stop flag every time a receive times out, both while waiting
//! for events and while waiting for a state reply, so `close()` returns
//! within one receive timeout.
//! A stopped subscription cannot be restarted; create a new one.
//!
//! ## Failure handling
//!
//! Malformed frames and failed state fetches are logged and skipped. Only
//! losing the event socket, or the state socket, ends the listener early.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command;
use crate::connection::{Connection, ConnectionConfig};
use crate::error::{IpcError, Result};
use crate::types::{AsEventType, EventType, Payload};

/// What a subscription hands to its callback
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Category the subscription listens to
    pub event_type: EventType,
    /// The event as sent by i3
    pub event: Payload,
    /// Full state fetched right after the event (e.g. all workspaces)
    pub state: Payload,
}

/// Handle to a running event listener
///
/// Dropping the handle stops the listener as well; `close()` additionally
/// waits for it to finish.
///
/// # Example
///
/// ```ignore
/// let sub = Subscription::spawn(&config, EventType::Workspace, Some("focus"), |n| {
///     println!("workspaces: {}", n.state);
/// })
/// .await?;
/// // ...
/// sub.close().await;
/// ```
#[derive(Debug)]
pub struct Subscription {
    event_type: EventType,
    event: Option<String>,
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Connect twice to i3 and start listening
    ///
    /// `event` filters on the `change` field of incoming events; `None`
    /// delivers every event of the category.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::UnsupportedEventType` for unknown categories, any
    /// connection error, or `IpcError::SubscribeRejected` if i3 refuses the
    /// subscription.
    pub async fn spawn<F>(
        config: &ConnectionConfig,
        event_type: impl AsEventType,
        event: Option<&str>,
        callback: F,
    ) -> Result<Self>
    where
        F: FnMut(Notification) + Send + 'static,
    {
        let event_type = event_type.to_event_type()?;
        let events = Connection::connect(config).await?;
        let data = Connection::connect(config).await?;
        Self::from_connections(events, data, event_type, event, callback).await
    }

    /// Start listening over connections the caller opened
    ///
    /// `events` is subscribed and read by the listener, `data` serves the
    /// follow-up state queries. Both are owned by the subscription from here
    /// on.
    pub async fn from_connections<S, F>(
        mut events: Connection<S>,
        data: Connection<S>,
        event_type: impl AsEventType,
        event: Option<&str>,
        callback: F,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: FnMut(Notification) + Send + 'static,
    {
        let event_type = event_type.to_event_type()?;

        let ack = events.subscribe(event_type, event).await?;
        if command::success(&ack) == Some(false) {
            return Err(IpcError::SubscribeRejected {
                reply: ack.to_string(),
            });
        }

        let (stop, stop_rx) = watch::channel(false);
        let listener = Listener {
            events,
            data,
            event_type,
            filter: event.map(str::to_string),
            callback,
            stop: stop_rx,
        };
        let handle = tokio::spawn(listener.run());

        info!(%event_type, event = ?event, "Subscription started");

        Ok(Self {
            event_type,
            event: event.map(str::to_string),
            stop,
            handle: Some(handle),
        })
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// The `change` filter, if any
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Whether the listener is still delivering events
    pub fn is_running(&self) -> bool {
        !*self.stop.borrow()
            && self
                .handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the listener and wait for it to finish
    pub async fn close(mut self) {
        self.stop.send_replace(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Subscription listener ended abnormally");
            }
        }
        debug!(event_type = %self.event_type, "Subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

/// Outcome of the state query that follows an event
enum Fetch {
    State(Payload),
    Skip,
    Stop,
}

struct Listener<S, F> {
    events: Connection<S>,
    data: Connection<S>,
    event_type: EventType,
    filter: Option<String>,
    callback: F,
    stop: watch::Receiver<bool>,
}

impl<S, F> Listener<S, F>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnMut(Notification),
{
    async fn run(mut self) {
        loop {
            let stopped = *self.stop.borrow();
            if stopped {
                break;
            }

            let event = match self.events.receive().await {
                Ok(Some(event)) => event,
                // Timed out; go round and look at the stop flag again
                Ok(None) => continue,
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, event_type = %self.event_type, "Event stream lost, stopping subscription");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, event_type = %self.event_type, "Skipping unreadable event");
                    continue;
                }
            };

            if !self.matches(&event) {
                debug!(change = ?event.change(), "Ignoring event");
                continue;
            }

            let state = match self.fetch_state().await {
                Fetch::State(state) => state,
                Fetch::Skip => continue,
                Fetch::Stop => break,
            };

            (self.callback)(Notification {
                event_type: self.event_type,
                event,
                state,
            });
        }

        info!(event_type = %self.event_type, "Subscription stopped");
    }

    /// Query the state on the data connection, giving up early on `close()`
    async fn fetch_state(&mut self) -> Fetch {
        let query = self.event_type.state_query();
        if let Err(e) = self.data.send(query, "").await {
            return self.fetch_failed(e);
        }

        let started = Instant::now();
        loop {
            let stopped = *self.stop.borrow();
            if stopped {
                debug!(%query, "Abandoning state fetch on close");
                return Fetch::Stop;
            }

            match self.data.receive_reply(query).await {
                Ok(Some(state)) => return Fetch::State(state),
                Ok(None) if started.elapsed() >= self.data.reply_timeout() => {
                    warn!(%query, event_type = %self.event_type, "No state reply within the reply timeout");
                    return Fetch::Skip;
                }
                Ok(None) => continue,
                Err(e) => return self.fetch_failed(e),
            }
        }
    }

    fn fetch_failed(&self, e: IpcError) -> Fetch {
        if e.is_fatal() {
            warn!(error = %e, event_type = %self.event_type, "State connection lost, stopping subscription");
            Fetch::Stop
        } else {
            warn!(error = %e, event_type = %self.event_type, "Failed to fetch state after event");
            Fetch::Skip
        }
    }

    fn matches(&self, event: &Payload) -> bool {
        match &self.filter {
            None => true,
            Some(filter) => event.change() == Some(filter.as_str()),
        }
    }
}
