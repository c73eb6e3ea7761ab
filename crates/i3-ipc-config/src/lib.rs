//! Configuration parsing for the i3-ipc client
//!
//! This crate reads the client's KDL configuration file: connection
//! defaults (socket, timeouts, framing) and the log level.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{parse_config, parse_config_str};
