//! Configuration data model

use std::path::PathBuf;
use std::time::Duration;

use i3_ipc::ConnectionConfig;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/i3-ipc/config.kdl";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub connection: ConnectionSettings,
    pub log_level: LogLevel,
}

/// `connection { ... }` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Socket path; discovered at runtime when unset
    pub socket: Option<PathBuf>,
    pub timeout_ms: u64,
    pub reply_timeout_ms: u64,
    pub chunk_size: usize,
    pub magic: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let defaults = ConnectionConfig::default();
        Self {
            socket: None,
            timeout_ms: defaults.timeout.as_millis() as u64,
            reply_timeout_ms: defaults.reply_timeout.as_millis() as u64,
            chunk_size: defaults.chunk_size,
            magic: String::from_utf8_lossy(&defaults.magic).into_owned(),
        }
    }
}

impl ClientConfig {
    /// Library settings for opening connections
    pub fn connection_config(&self) -> ConnectionConfig {
        let settings = &self.connection;
        let mut config = ConnectionConfig::default()
            .with_timeout(Duration::from_millis(settings.timeout_ms))
            .with_reply_timeout(Duration::from_millis(settings.reply_timeout_ms))
            .with_chunk_size(settings.chunk_size)
            .with_magic(settings.magic.as_bytes());
        config.socket_path = settings.socket.clone();
        config
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}
