//! Daemon mode: owns the animation pipeline and serves the control socket.

pub mod handler;

use crate::config::Config;
use crate::error::{FacelinkError, Result};
use crate::ipc::server::IpcServer;
use crate::pipeline::{PlaybackOutcome, PlaybackReport, Scheduler};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared by the command handler and the daemon main loop.
pub struct DaemonState {
    pub scheduler: Arc<Scheduler>,
    /// Notified when a client asks the daemon to stop.
    pub shutdown: Arc<Notify>,
}

impl DaemonState {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            shutdown: Arc::new(Notify::new()),
        }
    }
}

/// Run the daemon: build the pipeline, start the IPC server, wait for shutdown.
///
/// Pipeline construction and teardown run on the blocking pool; inference
/// clients may block and must not run on the async runtime.
pub async fn run_daemon(config: Config, socket_path: Option<PathBuf>) -> Result<()> {
    let scheduler = tokio::task::spawn_blocking(move || -> Result<Scheduler> {
        let mut scheduler = Scheduler::from_config(&config)?;
        scheduler.start()?;
        Ok(scheduler)
    })
    .await
    .map_err(|e| FacelinkError::Worker {
        message: format!("pipeline startup task failed: {}", e),
    })??;
    let scheduler = Arc::new(scheduler);

    let reports = scheduler.with_reports();
    std::thread::Builder::new()
        .name("facelink-reports".to_string())
        .spawn(move || {
            for report in reports.iter() {
                log_report(&report);
            }
        })
        .map_err(|e| FacelinkError::Worker {
            message: format!("failed to spawn report logger: {}", e),
        })?;

    let state = DaemonState::new(scheduler.clone());
    let shutdown = state.shutdown.clone();

    let socket_path = socket_path.unwrap_or_else(IpcServer::default_socket_path);
    let server = Arc::new(IpcServer::new(socket_path)?);

    let handler = handler::DaemonCommandHandler::new(state);
    let server_clone = Arc::clone(&server);
    let server_handle = tokio::spawn(async move { server_clone.start(handler).await });

    tracing::info!("daemon ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                tracing::error!("Error setting up signal handler: {}", e);
            }
            tracing::info!("received SIGTERM, shutting down");
        }
        _ = shutdown.notified() => {
            tracing::info!("shutdown requested over IPC");
        }
    }

    server.stop().await?;
    match server_handle.await {
        Ok(Err(e)) => tracing::error!("IPC server failed: {}", e),
        Err(e) => tracing::error!("IPC server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    // Anything still queued is abandoned; the clip on air plays out
    tokio::task::spawn_blocking(move || {
        let (requests, clips) = scheduler.clear();
        if requests + clips > 0 {
            tracing::info!(requests, clips, "discarded queued clips");
        }
        scheduler.shutdown();
    })
    .await
    .map_err(|e| FacelinkError::Worker {
        message: format!("pipeline shutdown task failed: {}", e),
    })?;

    tracing::info!("daemon stopped");
    Ok(())
}

fn log_report(report: &PlaybackReport) {
    let queued_ms = report.queued_for.as_millis() as u64;
    match &report.outcome {
        PlaybackOutcome::Completed => {
            tracing::info!(id = report.id, frames = report.frames, queued_ms, "clip played");
        }
        PlaybackOutcome::Degraded {
            audio_error,
            network_error,
        } => {
            tracing::warn!(
                id = report.id,
                frames = report.frames,
                audio_error = audio_error.as_deref().unwrap_or("-"),
                network_error = network_error.as_deref().unwrap_or("-"),
                "clip played with errors"
            );
        }
        PlaybackOutcome::Skipped { reason } => {
            tracing::warn!(id = report.id, "clip skipped: {}", reason);
        }
    }
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| FacelinkError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix, just wait forever (Ctrl+C will still work)
    std::future::pending::<()>().await
}
