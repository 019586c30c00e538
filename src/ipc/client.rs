//! CLI side of the control socket: one command line out, one reply line back.

use super::connection_error;
use crate::error::{FacelinkError, Result};
use crate::ipc::protocol::{Command, Response};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Run `command` on the daemon listening at `socket_path` and return its reply.
///
/// Socket failures, including a daemon that hangs up without replying, are
/// `IpcConnection`. Undecodable JSON in either direction is `IpcProtocol`.
pub async fn send_command(socket_path: &Path, command: Command) -> Result<Response> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(connection_error("Failed to connect to daemon"))?;
    let (reader, mut writer) = stream.into_split();

    let mut request = command.to_json().map_err(|e| FacelinkError::IpcProtocol {
        message: format!("Failed to encode command: {}", e),
    })?;
    request.push('\n');
    writer
        .write_all(request.as_bytes())
        .await
        .map_err(connection_error("Failed to send command"))?;
    writer
        .flush()
        .await
        .map_err(connection_error("Failed to send command"))?;

    let mut reply = String::new();
    let read = BufReader::new(reader)
        .read_line(&mut reply)
        .await
        .map_err(connection_error("Failed to read reply"))?;
    if read == 0 || reply.trim().is_empty() {
        return Err(FacelinkError::IpcConnection {
            message: "Daemon hung up without replying".to_string(),
        });
    }

    Response::from_json(reply.trim()).map_err(|e| FacelinkError::IpcProtocol {
        message: format!("Failed to decode reply: {}", e),
    })
}
