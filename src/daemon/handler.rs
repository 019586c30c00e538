//! Command handler implementation for the daemon.

use crate::daemon::DaemonState;
use crate::error::FacelinkError;
use crate::ipc::protocol::{Command, Response, decode_audio};
use crate::ipc::server::CommandHandler;
use std::sync::Arc;

/// Command handler for daemon IPC commands.
pub struct DaemonCommandHandler {
    state: Arc<DaemonState>,
}

impl DaemonCommandHandler {
    pub fn new(state: DaemonState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    fn submit(&self, audio: &str) -> Response {
        let bytes = match decode_audio(audio) {
            Ok(bytes) => bytes,
            Err(e) => return Response::error(format!("Invalid base64 audio: {}", e)),
        };
        match self.state.scheduler.submit(bytes) {
            Ok(id) => Response::Queued { id },
            Err(e) => Response::error(e.to_string()),
        }
    }

    fn clear(&self) -> Response {
        let (requests, clips) = self.state.scheduler.clear();
        Response::Cleared { requests, clips }
    }

    /// Runs inference on the blocking pool and answers with the raw frames.
    async fn shapes(&self, audio: &str) -> Response {
        let bytes = match decode_audio(audio) {
            Ok(bytes) => bytes,
            Err(e) => return Response::error(format!("Invalid base64 audio: {}", e)),
        };

        let scheduler = Arc::clone(&self.state.scheduler);
        let result = tokio::task::spawn_blocking(move || scheduler.shapes(&bytes))
            .await
            .map_err(|e| FacelinkError::Worker {
                message: format!("shapes task failed: {}", e),
            });

        match result {
            Ok(Ok(Some(frames))) => Response::Blendshapes {
                frames: frames.to_rows(),
            },
            Ok(Ok(None)) => Response::Blendshapes { frames: Vec::new() },
            Ok(Err(e)) | Err(e) => Response::error(e.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Submit { audio } => self.submit(&audio),
            Command::Clear => self.clear(),
            Command::Status => Response::Status {
                status: self.state.scheduler.status(),
            },
            Command::Shapes { audio } => self.shapes(&audio).await,
            Command::Shutdown => {
                self.state.shutdown.notify_one();
                Response::Ok
            }
        }
    }
}
