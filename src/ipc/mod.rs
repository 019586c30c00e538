//! Control socket shared by the daemon and the CLI.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::send_command;
pub use protocol::{Command, Response};
pub use server::{CommandHandler, IpcServer};

use crate::error::FacelinkError;

/// Maps a socket I/O failure to `IpcConnection`, prefixed with `context`.
fn connection_error(context: &'static str) -> impl FnOnce(std::io::Error) -> FacelinkError {
    move |e| FacelinkError::IpcConnection {
        message: format!("{}: {}", context, e),
    }
}
