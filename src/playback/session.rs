//! Lockstep audio and animation playback.
//!
//! Two threads per session, one per channel, both parked on the same
//! start latch. The latch is released once both have finished setup.
//! A failure on one channel never cancels the other.

use super::signal::StartTrigger;
use crate::audio::AudioPlayer;
use crate::config::Pacing;
use crate::defaults::PLAYBACK_READY_TIMEOUT_MS;
use crate::pipeline::types::PlaybackOutcome;
use crate::transport::FrameTransport;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Everything one foreground playback needs.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: u64,
    pub audio: Arc<[u8]>,
    pub packets: Vec<Vec<u8>>,
    pub fps: u32,
}

impl PlaybackSession {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// Per-channel results of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub audio: Result<(), String>,
    /// Packets delivered, or the first transport error.
    pub network: Result<usize, String>,
}

impl SessionOutcome {
    pub fn is_degraded(&self) -> bool {
        self.audio.is_err() || self.network.is_err()
    }

    pub fn to_playback_outcome(&self) -> PlaybackOutcome {
        if !self.is_degraded() {
            return PlaybackOutcome::Completed;
        }
        PlaybackOutcome::Degraded {
            audio_error: self.audio.as_ref().err().cloned(),
            network_error: self.network.as_ref().err().cloned(),
        }
    }
}

/// Plays sessions on the configured audio output and a lent transport.
#[derive(Clone)]
pub struct SyncPlayer {
    audio: Arc<dyn AudioPlayer>,
    pacing: Pacing,
}

impl SyncPlayer {
    pub fn new(audio: Arc<dyn AudioPlayer>, pacing: Pacing) -> Self {
        Self { audio, pacing }
    }

    /// Play to completion on both channels. The transport always comes back.
    pub fn play(
        &self,
        session: &PlaybackSession,
        mut transport: Box<dyn FrameTransport>,
    ) -> (SessionOutcome, Box<dyn FrameTransport>) {
        let mut trigger = StartTrigger::new();
        let audio_signal = trigger.party();
        let network_signal = trigger.party();
        let interval = session.frame_interval();
        let pacing = self.pacing;

        let outcome = thread::scope(|scope| {
            let player = &self.audio;
            let audio_handle = scope.spawn(move || {
                player
                    .play(&session.audio, &audio_signal)
                    .map_err(|e| e.to_string())
            });

            let transport = &mut transport;
            let network_handle = scope.spawn(move || {
                network_signal.wait();
                stream_packets(transport.as_mut(), &session.packets, interval, pacing)
            });

            let limit = Duration::from_millis(PLAYBACK_READY_TIMEOUT_MS);
            if !trigger.fire_when_ready(limit) {
                tracing::warn!(id = session.id, "starting before audio was ready");
            }

            let audio = audio_handle
                .join()
                .unwrap_or_else(|_| Err("audio thread panicked".to_string()));
            let network = network_handle
                .join()
                .unwrap_or_else(|_| Err("network thread panicked".to_string()));
            SessionOutcome { audio, network }
        });

        if let Err(e) = &outcome.audio {
            tracing::warn!(id = session.id, "audio playback failed: {}", e);
        }
        if let Err(e) = &outcome.network {
            tracing::warn!(id = session.id, "animation stream failed: {}", e);
        }
        (outcome, transport)
    }
}

fn stream_packets(
    transport: &mut dyn FrameTransport,
    packets: &[Vec<u8>],
    interval: Duration,
    pacing: Pacing,
) -> Result<usize, String> {
    let started = Instant::now();
    for (k, packet) in packets.iter().enumerate() {
        transport
            .send(packet)
            .map_err(|e| format!("frame {} of {}: {}", k, packets.len(), e))?;

        let pause = match pacing {
            Pacing::Fixed => interval,
            Pacing::Deadline => {
                let deadline = started + interval * (k as u32 + 1);
                deadline.saturating_duration_since(Instant::now())
            }
        };
        thread::sleep(pause);
    }
    Ok(packets.len())
}
