//! Idle animation shown whenever no clip is playing.

use crate::artifacts;
use crate::defaults::OUTPUT_DIM;
use crate::encode::{FrameEncoder, FrameTime};
use crate::error::{FacelinkError, Result};
use crate::frame::{Frame, NEUTRAL};
use crate::transport::FrameTransport;
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Looping idle frames. The first frame is the baseline pose clips blend against.
#[derive(Debug, Clone, PartialEq)]
pub struct IdleClip {
    frames: Vec<Frame>,
}

impl IdleClip {
    pub fn new(frames: Vec<Frame>) -> Result<Self> {
        if frames.is_empty() {
            return Err(FacelinkError::ConfigInvalidValue {
                key: "idle.clip".to_string(),
                message: "idle clip has no frames".to_string(),
            });
        }
        Ok(Self { frames })
    }

    /// Relaxed face with a neutral emotion score.
    pub fn neutral() -> Self {
        let mut frame = [0.0; OUTPUT_DIM];
        frame[NEUTRAL] = 1.0;
        Self {
            frames: vec![frame],
        }
    }

    /// Load a `shapes.csv` file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::new(artifacts::load_shapes(path)?.into_frames())
    }

    pub fn baseline(&self) -> Frame {
        self.frames[0]
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

struct Running {
    stop_tx: Sender<()>,
    handle: JoinHandle<Box<dyn FrameTransport>>,
}

/// Owns the transport while stopped; the loop thread owns it while running.
pub struct IdleLoop {
    clip: Arc<IdleClip>,
    encoder: Arc<dyn FrameEncoder>,
    fps: u32,
    transport: Option<Box<dyn FrameTransport>>,
    running: Option<Running>,
}

impl IdleLoop {
    pub fn new(
        clip: IdleClip,
        encoder: Arc<dyn FrameEncoder>,
        fps: u32,
        transport: Box<dyn FrameTransport>,
    ) -> Self {
        Self {
            clip: Arc::new(clip),
            encoder,
            fps: fps.max(1),
            transport: Some(transport),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn baseline(&self) -> Frame {
        self.clip.baseline()
    }

    /// Start streaming the idle clip. No-op if already running.
    ///
    /// Returns false when the transport is currently lent out.
    pub fn start(&mut self) -> bool {
        if self.running.is_some() {
            return true;
        }
        let Some(transport) = self.transport.take() else {
            tracing::warn!("idle loop start requested without a transport");
            return false;
        };

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let clip = self.clip.clone();
        let encoder = self.encoder.clone();
        let interval = Duration::from_secs_f64(1.0 / self.fps as f64);
        let fps = self.fps;

        let handle = thread::spawn(move || {
            let mut transport = transport;
            let start = FrameTime::now(fps);
            let frames = clip.frames();
            let mut tick = 0usize;
            let mut warned = false;

            loop {
                let frame = &frames[tick % frames.len()];
                let packet = encoder.encode(frame, start.advance(tick));
                if let Err(e) = transport.send(&packet)
                    && !warned
                {
                    tracing::warn!("idle animation send failed: {}", e);
                    warned = true;
                }
                tick += 1;

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            tracing::trace!(frames = tick, "idle loop stopped");
            transport
        });

        tracing::debug!("idle loop started");
        self.running = Some(Running { stop_tx, handle });
        true
    }

    /// Signal the loop and wait for it to hand the transport back.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.stop_tx.send(()).ok();
        match running.handle.join() {
            Ok(transport) => self.transport = Some(transport),
            Err(_) => tracing::error!("idle loop thread panicked; transport lost"),
        }
    }

    /// Stop the loop and lend out the transport.
    pub fn suspend(&mut self) -> Option<Box<dyn FrameTransport>> {
        self.stop();
        self.transport.take()
    }

    /// Return a lent transport. The loop stays stopped.
    pub fn park(&mut self, transport: Box<dyn FrameTransport>) {
        self.stop();
        self.transport = Some(transport);
    }
}

impl Drop for IdleLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
