// Virtual X server (Xvfb)
// Started at most once per process and kept alive until the handle drops.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use doorstop_harness_core::application::constants::VIRTUAL_DISPLAY_STARTUP;
use doorstop_harness_core::{HarnessError, Result};

const XVFB_BINARY: &str = "Xvfb";

/// Another server already owns the display; good enough for us
const ALREADY_ACTIVE: &str = "Server is already active";

const SOCKET_POLL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct VirtualDisplay {
    display_id: String,
    /// None when an existing server is reused
    server: Option<Child>,
}

impl VirtualDisplay {
    pub fn socket_path(display_id: &str) -> PathBuf {
        PathBuf::from(format!("/tmp/.X11-unix/X{display_id}"))
    }

    /// Start `Xvfb :<id>` and wait until its socket shows up
    ///
    /// # Errors
    /// - HarnessError::Spawn if Xvfb is not installed
    /// - HarnessError::Misconfiguration if it exits early or never creates the socket
    pub async fn start(display_id: &str) -> Result<Self> {
        let mut server = Command::new(XVFB_BINARY)
            .arg(format!(":{display_id}"))
            .args(["-screen", "0", "640x480x24", "-nolisten", "tcp"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::Spawn(format!("{XVFB_BINARY}: {e}")))?;

        let socket = Self::socket_path(display_id);
        let started = Instant::now();

        loop {
            if let Some(status) = server.try_wait()? {
                let mut stderr = String::new();
                if let Some(mut pipe) = server.stderr.take() {
                    pipe.read_to_string(&mut stderr).await?;
                }

                if stderr.contains(ALREADY_ACTIVE) {
                    info!(display = %display_id, "Reusing running X server");
                    return Ok(Self {
                        display_id: display_id.to_string(),
                        server: None,
                    });
                }
                return Err(HarnessError::Misconfiguration(format!(
                    "Failed to start {XVFB_BINARY} ({status}): {}",
                    stderr.trim()
                )));
            }

            if tokio::fs::try_exists(&socket).await? {
                break;
            }
            if started.elapsed() >= VIRTUAL_DISPLAY_STARTUP {
                return Err(HarnessError::Misconfiguration(format!(
                    "{XVFB_BINARY} did not create the X11 socket at {}",
                    socket.display()
                )));
            }
            tokio::time::sleep(SOCKET_POLL).await;
        }

        // drain stderr so a chatty server never blocks
        if let Some(pipe) = server.stderr.take() {
            let display_name = display_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(pipe).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(display = %display_name, "Xvfb: {}", line);
                }
            });
        }

        info!(display = %display_id, pid = ?server.id(), "Started virtual display");
        Ok(Self {
            display_id: display_id.to_string(),
            server: Some(server),
        })
    }
}

impl Drop for VirtualDisplay {
    // the server itself goes with kill_on_drop
    fn drop(&mut self) {
        if let Some(server) = &self.server {
            debug!(display = %self.display_id, pid = ?server.id(), "Stopping virtual display");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path() {
        assert_eq!(
            VirtualDisplay::socket_path("3785252"),
            PathBuf::from("/tmp/.X11-unix/X3785252")
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        // only meaningful where Xvfb is absent
        if std::env::var_os("PATH").is_some_and(|path| {
            std::env::split_paths(&path).any(|dir| dir.join(XVFB_BINARY).exists())
        }) {
            return;
        }
        let err = VirtualDisplay::start("3785299").await.unwrap_err();
        assert!(matches!(err, HarnessError::Spawn(_)));
    }
}
