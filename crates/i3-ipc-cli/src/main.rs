//! i3-ipc CLI
//!
//! Sends a single message to i3 and prints the reply, or listens for events.
//!
//! ```text
//! i3-ipc workspace 2
//! i3-ipc -t get_workspaces
//! i3-ipc -t workspace focus          # print focus events until Ctrl+C
//! i3-ipc -t subscribe output
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use i3_ipc::{Connection, ConnectionConfig, EventType, Notification, Payload, Subscription};
use i3_ipc_config::{ClientConfig, DEFAULT_CONFIG_PATH};
use miette::{IntoDiagnostic, WrapErr};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "i3-ipc")]
#[command(about = "Talk to i3 over its IPC socket")]
#[command(version)]
struct Cli {
    /// Custom path to an i3 socket file
    #[arg(short = 's', long, value_name = "SOCKET")]
    socket: Option<PathBuf>,

    /// Message type in text form (e.g. "get_tree"), or an event type to listen to
    #[arg(short = 't', long = "type", value_name = "TYPE", default_value = "command")]
    message_type: String,

    /// Seconds before a socket read times out, fractions allowed
    #[arg(short = 'T', long, value_name = "SECONDS")]
    timeout: Option<f64>,

    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Message or "payload" to send, may be several words
    message: Vec<String>,
}

/// What the invocation asks for
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Request { message_type: String, payload: String },
    Listen { event_type: String, event: Option<String> },
}

impl Cli {
    fn action(&self) -> Action {
        let payload = self.message.join(" ");

        if EventType::ALL
            .iter()
            .any(|event_type| event_type.name() == self.message_type)
        {
            return Action::Listen {
                event_type: self.message_type.clone(),
                event: Some(payload).filter(|event| !event.is_empty()),
            };
        }

        if self.message_type == "subscribe" {
            let mut words = self.message.iter();
            let event_type = words.next().cloned().unwrap_or_default();
            let event = words.cloned().collect::<Vec<_>>().join(" ");
            return Action::Listen {
                event_type,
                event: Some(event).filter(|event| !event.is_empty()),
            };
        }

        Action::Request {
            message_type: self.message_type.clone(),
            payload,
        }
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();
    let config = load_config(&config_path)?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let connection_config = connection_config(&cli, &config)?;

    match cli.action() {
        Action::Request {
            message_type,
            payload,
        } => cmd_request(&connection_config, &message_type, &payload).await,
        Action::Listen { event_type, event } => {
            cmd_listen(&connection_config, &event_type, event.as_deref()).await
        }
    }
}

fn load_config(path: &Path) -> miette::Result<ClientConfig> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    Ok(i3_ipc_config::parse_config(path)?)
}

/// Config file settings, overridden by command-line flags
fn connection_config(cli: &Cli, config: &ClientConfig) -> miette::Result<ConnectionConfig> {
    let mut connection_config = config.connection_config();

    if let Some(socket) = &cli.socket {
        connection_config.socket_path = Some(socket.clone());
    }

    if let Some(seconds) = cli.timeout {
        let timeout = Duration::try_from_secs_f64(seconds)
            .into_diagnostic()
            .wrap_err_with(|| format!("Invalid timeout: {}", seconds))?;
        connection_config.timeout = timeout;
    }

    Ok(connection_config)
}

async fn connect(config: &ConnectionConfig) -> miette::Result<Connection> {
    Connection::connect(config)
        .await
        .into_diagnostic()
        .wrap_err("Couldn't connect to i3. Are you sure i3 is running?")
}

async fn cmd_request(
    config: &ConnectionConfig,
    message_type: &str,
    payload: &str,
) -> miette::Result<()> {
    // Reject unknown types before opening a socket
    let message_type: i3_ipc::MessageType = message_type.parse().into_diagnostic()?;

    let mut connection = connect(config).await?;
    let reply = connection
        .get(message_type, payload)
        .await
        .into_diagnostic()?;
    println!("{}", render(&reply)?);

    connection.close().await.into_diagnostic()?;
    Ok(())
}

async fn cmd_listen(
    config: &ConnectionConfig,
    event_type: &str,
    event: Option<&str>,
) -> miette::Result<()> {
    let event_type: EventType = event_type.parse().into_diagnostic()?;

    let subscription = Subscription::spawn(config, event_type, event, print_notification)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("Couldn't subscribe to {} events", event_type))?;

    tracing::info!("Listening for {} events, Ctrl+C to stop", event_type);

    tokio::signal::ctrl_c().await.into_diagnostic()?;

    subscription.close().await;
    Ok(())
}

fn print_notification(notification: Notification) {
    let line = serde_json::json!({
        "event": notification.event,
        "state": notification.state,
    });
    println!("{}", line);
}

fn render(payload: &Payload) -> miette::Result<String> {
    match payload {
        Payload::Json(value) => serde_json::to_string_pretty(value).into_diagnostic(),
        Payload::Text(text) => Ok(text.clone()),
    }
}
