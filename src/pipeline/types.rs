//! Data types flowing through the animation pipeline.

use crate::frame::FrameSequence;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A queued audio clip awaiting inference.
#[derive(Debug, Clone)]
pub struct AudioRequest {
    /// Sequence number assigned at admission, monotonically increasing.
    pub id: u64,
    /// WAV bytes as submitted.
    pub audio: Arc<[u8]>,
    /// When the request was admitted.
    pub enqueued: Instant,
}

impl AudioRequest {
    pub fn new(id: u64, audio: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id,
            audio: audio.into(),
            enqueued: Instant::now(),
        }
    }
}

/// A request whose animation frames are ready for playback.
#[derive(Debug, Clone)]
pub struct PreparedClip {
    pub request: AudioRequest,
    pub frames: FrameSequence,
}

/// Queue item: either work or the shutdown sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum Job<T> {
    Item(T),
    Shutdown,
}

impl<T> Job<T> {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Job::Shutdown)
    }
}

/// How a foreground session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Both channels ran to completion.
    Completed,
    /// At least one channel failed; the other was left to finish.
    Degraded {
        audio_error: Option<String>,
        network_error: Option<String>,
    },
    /// The clip was rejected before playback started.
    Skipped { reason: String },
}

/// Published to observers after every playback attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub id: u64,
    pub frames: usize,
    /// Time between admission and the start of playback.
    pub queued_for: Duration,
    pub outcome: PlaybackOutcome,
}

/// Snapshot of scheduler queues and counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub pending_requests: usize,
    pub prepared_clips: usize,
    pub idle_running: bool,
    /// Both worker threads are alive.
    pub workers_running: bool,
    /// New clips are being admitted.
    pub accepting: bool,
    pub accepted: u64,
    pub played: u64,
    pub degraded: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// Counters shared by the scheduler and its workers.
#[derive(Debug, Default)]
pub struct Counters {
    pub accepted: AtomicU64,
    pub played: AtomicU64,
    pub degraded: AtomicU64,
    pub dropped: AtomicU64,
    pub failed: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counter fields of a status snapshot; queue depths are left at zero.
    pub fn snapshot(&self) -> SchedulerStatus {
        SchedulerStatus {
            accepted: self.accepted.load(Ordering::Relaxed),
            played: self.played.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}
