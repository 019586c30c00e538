//! Wire serialization of animation frames.
//!
//! The LiveLink Face packet layout, all integers big-endian except the
//! leading version:
//!
//! | field            | type            |
//! |------------------|-----------------|
//! | version (6)      | u32 LE          |
//! | subject id       | `$` + UUID text |
//! | name length      | i32             |
//! | name             | UTF-8           |
//! | frame number     | u32             |
//! | sub-frame        | f32             |
//! | fps              | u32             |
//! | fps denominator  | u32             |
//! | shape count (61) | u8              |
//! | shapes           | 61 x f32        |

use crate::defaults::OUTPUT_DIM;
use crate::frame::{ANIMATION_CHANNELS, Frame};
use std::time::{SystemTime, UNIX_EPOCH};

pub const LIVELINK_VERSION: u32 = 6;

/// Timecode of one frame: whole frames plus a fractional remainder.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTime {
    pub frame: u32,
    pub sub_frame: f32,
}

impl FrameTime {
    pub fn from_seconds(seconds: f64, fps: u32) -> Self {
        let total = seconds.max(0.0) * fps as f64;
        Self {
            frame: total.floor() as u32,
            sub_frame: total.fract() as f32,
        }
    }

    /// Current wall-clock time of day (UTC) as a timecode.
    pub fn now(fps: u32) -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self::from_seconds(since_epoch % 86_400.0, fps)
    }

    /// The timecode `frames` ticks later.
    pub fn advance(self, frames: usize) -> Self {
        Self {
            frame: self.frame.wrapping_add(frames as u32),
            sub_frame: self.sub_frame,
        }
    }
}

/// Serializes one 68-channel frame for the transport.
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &Frame, time: FrameTime) -> Vec<u8>;
}

/// LiveLink Face packet encoder for one subject.
#[derive(Debug, Clone)]
pub struct LiveLinkEncoder {
    subject_id: String,
    name: String,
    fps: u32,
}

impl LiveLinkEncoder {
    /// New encoder with a random subject id.
    pub fn new(name: &str, fps: u32) -> Self {
        Self::with_subject_id(&uuid::Uuid::new_v4().to_string(), name, fps)
    }

    pub fn with_subject_id(id: &str, name: &str, fps: u32) -> Self {
        Self {
            subject_id: format!("${}", id),
            name: name.to_string(),
            fps,
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Size of every packet this encoder produces.
    pub fn packet_len(&self) -> usize {
        4 + self.subject_id.len() + 4 + self.name.len() + 8 + 8 + 1 + ANIMATION_CHANNELS * 4
    }
}

impl FrameEncoder for LiveLinkEncoder {
    fn encode(&self, frame: &Frame, time: FrameTime) -> Vec<u8> {
        let mut packet = Vec::with_capacity(self.packet_len());
        packet.extend_from_slice(&LIVELINK_VERSION.to_le_bytes());
        packet.extend_from_slice(self.subject_id.as_bytes());
        packet.extend_from_slice(&(self.name.len() as i32).to_be_bytes());
        packet.extend_from_slice(self.name.as_bytes());
        packet.extend_from_slice(&time.frame.to_be_bytes());
        packet.extend_from_slice(&time.sub_frame.to_be_bytes());
        packet.extend_from_slice(&self.fps.to_be_bytes());
        packet.extend_from_slice(&1u32.to_be_bytes());
        packet.push(ANIMATION_CHANNELS as u8);
        for value in &frame[..ANIMATION_CHANNELS] {
            packet.extend_from_slice(&value.to_be_bytes());
        }
        packet
    }
}

/// Mock encoder for testing
///
/// Emits the frame number (u32 LE) followed by all 68 channels (f32 LE), so
/// emotion channels survive the trip and can be used as markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockEncoder;

impl MockEncoder {
    pub const PACKET_LEN: usize = 4 + OUTPUT_DIM * 4;

    pub fn decode(packet: &[u8]) -> Option<(u32, Frame)> {
        if packet.len() != Self::PACKET_LEN {
            return None;
        }
        let frame_number = u32::from_le_bytes(packet[..4].try_into().ok()?);
        let mut frame = [0.0; OUTPUT_DIM];
        for (value, chunk) in frame.iter_mut().zip(packet[4..].chunks_exact(4)) {
            *value = f32::from_le_bytes(chunk.try_into().ok()?);
        }
        Some((frame_number, frame))
    }
}

impl FrameEncoder for MockEncoder {
    fn encode(&self, frame: &Frame, time: FrameTime) -> Vec<u8> {
        let mut packet = Vec::with_capacity(Self::PACKET_LEN);
        packet.extend_from_slice(&time.frame.to_le_bytes());
        for value in frame {
            packet.extend_from_slice(&value.to_le_bytes());
        }
        packet
    }
}
