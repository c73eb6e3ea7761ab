//! Protocol tables and decoded message types
//!
//! The message table and the event set are closed: a message's wire
//! encoding is its position in [`MessageType::ALL`], and anything outside
//! these tables is rejected before it can reach the socket.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::error::{IpcError, Result};

/// Kind of request/reply a frame carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Command,
    GetWorkspaces,
    Subscribe,
    GetOutputs,
    GetTree,
    GetMarks,
    GetBarConfig,
}

impl MessageType {
    /// Wire table, indexed by the value sent on the socket
    pub const ALL: [MessageType; 7] = [
        MessageType::Command,
        MessageType::GetWorkspaces,
        MessageType::Subscribe,
        MessageType::GetOutputs,
        MessageType::GetTree,
        MessageType::GetMarks,
        MessageType::GetBarConfig,
    ];

    /// Name used by i3 (and by `i3-msg -t`)
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Command => "command",
            MessageType::GetWorkspaces => "get_workspaces",
            MessageType::Subscribe => "subscribe",
            MessageType::GetOutputs => "get_outputs",
            MessageType::GetTree => "get_tree",
            MessageType::GetMarks => "get_marks",
            MessageType::GetBarConfig => "get_bar_config",
        }
    }

    /// Integer written into the frame header
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Exact lookup by name, without the numeric fallback of `FromStr`
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for MessageType {
    type Error = IpcError;

    fn try_from(index: u32) -> Result<Self> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| IpcError::UnsupportedMessageType(index.to_string()))
    }
}

/// Accepts either the type name (`"get_tree"`) or its index (`"4"`)
impl FromStr for MessageType {
    type Err = IpcError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(t) = Self::from_name(s) {
            return Ok(t);
        }
        match s.parse::<u32>() {
            Ok(index) => Self::try_from(index)
                .map_err(|_| IpcError::UnsupportedMessageType(s.to_string())),
            Err(_) => Err(IpcError::UnsupportedMessageType(s.to_string())),
        }
    }
}

/// Category of asynchronous notification a subscription listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Workspace,
    Output,
}

impl EventType {
    pub const ALL: [EventType; 2] = [EventType::Workspace, EventType::Output];

    pub fn name(self) -> &'static str {
        match self {
            EventType::Workspace => "workspace",
            EventType::Output => "output",
        }
    }

    /// Request used to fetch full state after an event of this category
    pub fn state_query(self) -> MessageType {
        match self {
            EventType::Workspace => MessageType::GetWorkspaces,
            EventType::Output => MessageType::GetOutputs,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts either the event name (`"output"`) or its index (`"1"`)
impl FromStr for EventType {
    type Err = IpcError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(t) = Self::ALL.into_iter().find(|t| t.name() == s) {
            return Ok(t);
        }
        s.parse::<usize>()
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .ok_or_else(|| IpcError::UnsupportedEventType(s.to_string()))
    }
}

/// Anything that names a message type
///
/// Lets request methods take either a [`MessageType`] or a string, while
/// making sure unknown names fail before any I/O happens.
pub trait AsMessageType {
    fn to_message_type(&self) -> Result<MessageType>;
}

impl AsMessageType for MessageType {
    fn to_message_type(&self) -> Result<MessageType> {
        Ok(*self)
    }
}

impl AsMessageType for str {
    fn to_message_type(&self) -> Result<MessageType> {
        self.parse()
    }
}

impl AsMessageType for String {
    fn to_message_type(&self) -> Result<MessageType> {
        self.parse()
    }
}

impl<T: AsMessageType + ?Sized> AsMessageType for &T {
    fn to_message_type(&self) -> Result<MessageType> {
        (**self).to_message_type()
    }
}

/// Anything that names an event type
pub trait AsEventType {
    fn to_event_type(&self) -> Result<EventType>;
}

impl AsEventType for EventType {
    fn to_event_type(&self) -> Result<EventType> {
        Ok(*self)
    }
}

impl AsEventType for str {
    fn to_event_type(&self) -> Result<EventType> {
        self.parse()
    }
}

impl AsEventType for String {
    fn to_event_type(&self) -> Result<EventType> {
        self.parse()
    }
}

impl<T: AsEventType + ?Sized> AsEventType for &T {
    fn to_event_type(&self) -> Result<EventType> {
        (**self).to_event_type()
    }
}

/// Decoded body of a frame
///
/// i3 answers in JSON, but occasionally sends plain diagnostic text; that
/// text is kept as is instead of being treated as an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    /// Parse `raw` as JSON, falling back to the raw text
    pub fn parse(raw: String) -> Self {
        match serde_json::from_str(&raw) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Text(raw),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    /// Field lookup on a JSON object payload
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_json().and_then(|value| value.get(key))
    }

    /// The `change` field carried by i3 event payloads
    pub fn change(&self) -> Option<&str> {
        self.get("change").and_then(Value::as_str)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Json(value) => write!(f, "{}", value),
            Payload::Text(text) => f.write_str(text),
        }
    }
}

/// One complete protocol message
///
/// `message_type` is kept as the raw header value: i3 sets the high bit on
/// event frames, so not every value received maps back into the table.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub message_type: u32,
    pub payload: Payload,
}

impl Frame {
    /// Bit i3 sets on the type field of asynchronous event frames
    pub const EVENT_BIT: u32 = 1 << 31;

    pub fn kind(&self) -> Result<MessageType> {
        MessageType::try_from(self.message_type)
    }

    pub fn is_event(&self) -> bool {
        self.message_type & Self::EVENT_BIT != 0
    }
}
