//! Daemon side of the control socket.
//!
//! Every connection carries exactly one JSON command line and gets exactly
//! one JSON reply line; each is served on its own task.

use super::connection_error;
use crate::error::{FacelinkError, Result};
use crate::ipc::protocol::{Command, Response};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

/// Executes decoded commands for the server.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command) -> Response;
}

/// Listens on a Unix socket until stopped.
pub struct IpcServer {
    socket_path: PathBuf,
    stopped: watch::Sender<bool>,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf) -> Result<Self> {
        let (stopped, _) = watch::channel(false);
        Ok(Self {
            socket_path,
            stopped,
        })
    }

    /// `$XDG_RUNTIME_DIR/facelink.sock`, else a per-user path in `/tmp`.
    pub fn default_socket_path() -> PathBuf {
        if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
            PathBuf::from(xdg_runtime).join("facelink.sock")
        } else {
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/facelink-{}.sock", uid))
        }
    }

    /// Accept connections until [`stop`](Self::stop) is called.
    pub async fn start<H>(&self, handler: H) -> Result<()>
    where
        H: CommandHandler + 'static,
    {
        let listener = self.bind()?;
        let handler = Arc::new(handler);
        let mut stopped = self.stopped.subscribe();

        while !*stopped.borrow_and_update() {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) =
                        accepted.map_err(connection_error("Failed to accept connection"))?;
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, handler.as_ref()).await {
                            tracing::warn!("control connection failed: {}", e);
                        }
                    });
                }
                _ = stopped.changed() => {}
            }
        }
        tracing::debug!("control socket closed");
        Ok(())
    }

    /// End the accept loop and remove the socket file.
    pub async fn stop(&self) -> Result<()> {
        self.stopped.send_replace(true);
        remove_socket(&self.socket_path)
    }

    fn bind(&self) -> Result<UnixListener> {
        // Left behind by a daemon that did not stop cleanly
        remove_socket(&self.socket_path)?;
        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| FacelinkError::IpcSocket {
                message: format!("Failed to bind {}: {}", self.socket_path.display(), e),
            })?;
        tracing::info!(socket = %self.socket_path.display(), "control socket listening");
        Ok(listener)
    }
}

fn remove_socket(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FacelinkError::IpcSocket {
            message: format!("Failed to remove {}: {}", path.display(), e),
        }),
    }
}

async fn serve_connection<H>(stream: UnixStream, handler: &H) -> Result<()>
where
    H: CommandHandler + ?Sized,
{
    let (reader, mut writer) = stream.into_split();
    let mut request = String::new();
    let read = BufReader::new(reader)
        .read_line(&mut request)
        .await
        .map_err(connection_error("Failed to read command"))?;
    if read == 0 {
        return Ok(());
    }

    let response = match Command::from_json(request.trim()) {
        Ok(command) => handler.handle(command).await,
        Err(e) => {
            tracing::debug!("rejected malformed command: {}", e);
            Response::error(format!("Failed to parse command: {}", e))
        }
    };

    let mut reply = response.to_json().map_err(|e| FacelinkError::IpcProtocol {
        message: format!("Failed to encode reply: {}", e),
    })?;
    reply.push('\n');
    writer
        .write_all(reply.as_bytes())
        .await
        .map_err(connection_error("Failed to send reply"))?;
    writer
        .flush()
        .await
        .map_err(connection_error("Failed to send reply"))
}
