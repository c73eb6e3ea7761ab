//! Socket path discovery
//!
//! i3 exports its IPC socket path in `$I3SOCK` for the processes it
//! starts. Outside of those, the running window manager is asked directly
//! with `i3 --get-socketpath`.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::debug;

use crate::error::{IpcError, Result};

/// Environment variable holding the i3 socket path
pub const I3SOCK_ENV: &str = "I3SOCK";

/// Binary queried when `$I3SOCK` is not set
pub const DEFAULT_WM_BINARY: &str = "i3";

/// Discover the i3 IPC socket path
///
/// # Errors
///
/// Returns `IpcError::SocketPathUnavailable` if `$I3SOCK` is unset and
/// `i3 --get-socketpath` fails or prints nothing.
pub async fn get_socket_path() -> Result<PathBuf> {
    if let Some(path) = socket_path_from_env() {
        debug!(path = %path.display(), "Using socket path from ${}", I3SOCK_ENV);
        return Ok(path);
    }
    query_socket_path(DEFAULT_WM_BINARY).await
}

/// Socket path from `$I3SOCK`, ignoring an empty value
pub fn socket_path_from_env() -> Option<PathBuf> {
    std::env::var_os(I3SOCK_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Ask a window manager binary for its socket path with `--get-socketpath`
///
/// Works for i3 and for compatible window managers such as sway.
pub async fn query_socket_path(binary: &str) -> Result<PathBuf> {
    let output = Command::new(binary)
        .arg("--get-socketpath")
        .output()
        .await
        .map_err(|e| IpcError::SocketPathUnavailable {
            reason: format!("failed to run `{} --get-socketpath`: {}", binary, e),
        })?;

    if !output.status.success() {
        return Err(IpcError::SocketPathUnavailable {
            reason: format!("`{} --get-socketpath` exited with {}", binary, output.status),
        });
    }

    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() {
        return Err(IpcError::SocketPathUnavailable {
            reason: format!("`{} --get-socketpath` printed nothing", binary),
        });
    }

    debug!(path = %path, binary, "Resolved socket path");
    Ok(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Tests touching I3SOCK must not run in parallel
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn with_i3sock<T>(value: Option<&str>, f: impl FnOnce() -> T) -> T {
        let _guard = ENV_MUTEX.lock().unwrap();
        let original = env::var(I3SOCK_ENV).ok();

        match value {
            Some(v) => env::set_var(I3SOCK_ENV, v),
            None => env::remove_var(I3SOCK_ENV),
        }
        let result = f();

        match original {
            Some(v) => env::set_var(I3SOCK_ENV, v),
            None => env::remove_var(I3SOCK_ENV),
        }
        result
    }

    #[test]
    fn test_env_socket_path() {
        let path = with_i3sock(Some("/run/user/1000/i3/ipc-socket.42"), socket_path_from_env);
        assert_eq!(path, Some(PathBuf::from("/run/user/1000/i3/ipc-socket.42")));
    }

    #[test]
    fn test_env_socket_path_unset_or_empty() {
        assert_eq!(with_i3sock(None, socket_path_from_env), None);
        assert_eq!(with_i3sock(Some(""), socket_path_from_env), None);
    }

    #[tokio::test]
    async fn test_query_trims_output() {
        // `echo --get-socketpath` prints its argument followed by a newline
        let path = query_socket_path("echo").await.unwrap();
        assert_eq!(path, PathBuf::from("--get-socketpath"));
    }

    #[tokio::test]
    async fn test_query_missing_binary() {
        let err = query_socket_path("definitely-not-a-window-manager-12345")
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::SocketPathUnavailable { .. }));
        assert!(err.to_string().contains("is i3 running?"));
    }

    #[tokio::test]
    async fn test_query_failing_binary() {
        let err = query_socket_path("false").await.unwrap_err();
        match err {
            IpcError::SocketPathUnavailable { reason } => {
                assert!(reason.contains("exited with"), "unexpected reason: {}", reason)
            }
            other => panic!("Expected SocketPathUnavailable, got: {:?}", other),
        }
    }
}
