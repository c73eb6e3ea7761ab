//! KDL configuration parser

use std::path::Path;

use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<ClientConfig, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl re-exports an older miette, so rebuild the span by hand
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = ClientConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "connection" => {
                config.connection = parse_connection(node)?;
            }
            "log-level" => {
                let level = first_string(node, "log-level")?;
                config.log_level = level
                    .parse::<LogLevel>()
                    .map_err(|message| ConfigError::Invalid { message })?;
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

fn parse_connection(node: &kdl::KdlNode) -> Result<ConnectionSettings, ConfigError> {
    let mut settings = ConnectionSettings::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "socket" => {
                    let path = first_string(child, "socket")?;
                    settings.socket = Some(shellexpand::tilde(path).into_owned().into());
                }
                "timeout-ms" => {
                    settings.timeout_ms = positive_int(child, "timeout-ms")?;
                }
                "reply-timeout-ms" => {
                    settings.reply_timeout_ms = positive_int(child, "reply-timeout-ms")?;
                }
                "chunk-size" => {
                    settings.chunk_size = positive_int(child, "chunk-size")? as usize;
                }
                "magic" => {
                    let magic = first_string(child, "magic")?;
                    if magic.is_empty() {
                        return Err(ConfigError::Invalid {
                            message: "`magic` must not be empty".to_string(),
                        });
                    }
                    settings.magic = magic.to_string();
                }
                name => {
                    tracing::warn!("Unknown connection option: {}", name);
                }
            }
        }
    }

    Ok(settings)
}

fn first_string<'a>(node: &'a kdl::KdlNode, option: &str) -> Result<&'a str, ConfigError> {
    node.entries()
        .first()
        .and_then(|entry| entry.value().as_string())
        .ok_or_else(|| ConfigError::Invalid {
            message: format!("`{}` expects a string value", option),
        })
}

fn positive_int(node: &kdl::KdlNode, option: &str) -> Result<u64, ConfigError> {
    node.entries()
        .first()
        .and_then(|entry| entry.value().as_i64())
        .filter(|value| *value > 0)
        .map(|value| value as u64)
        .ok_or_else(|| ConfigError::Invalid {
            message: format!("`{}` expects a positive integer", option),
        })
}
