//! Default configuration constants for facelink.
//!
//! Shared by the configuration types and the pipeline components so that the
//! values stay consistent across the crate.

/// Animation frame rate in frames per second.
///
/// The sequence model emits one frame per 60 fps tick, and the rendering
/// engine expects the stream at the same cadence.
pub const FRAME_RATE: u32 = 60;

/// Number of channels in every model output frame.
pub const OUTPUT_DIM: usize = 68;

/// Number of feature time steps the sequence model consumes per window.
pub const WINDOW_SIZE: usize = 256;

/// Blend-in duration as a fraction of one second.
pub const BLEND_IN_SECS: f32 = 0.1;

/// Blend-out duration as a fraction of one second.
pub const BLEND_OUT_SECS: f32 = 0.3;

/// Analysis frame length in seconds for feature extraction (~one 60 fps tick).
pub const ANALYSIS_FRAME_SECS: f32 = 0.01667;

/// Minimum number of analysis frames needed before inference is attempted.
///
/// Shorter clips are reported as insufficient data and dropped.
pub const MIN_ANALYSIS_FRAMES: usize = 9;

/// Default address of the rendering engine's LiveLink receiver.
pub const TRANSPORT_ADDR: &str = "127.0.0.1:11111";

/// Default subject name announced in LiveLink packets.
pub const SUBJECT_NAME: &str = "facelink";

/// Upper bound on establishing a TCP connection to the rendering engine.
pub const TCP_CONNECT_TIMEOUT_MS: u64 = 200;

/// Upper bound on one TCP packet write; a few frame intervals at 60 fps.
pub const TCP_WRITE_TIMEOUT_MS: u64 = 50;

/// Minimum gap between TCP reconnect attempts after a failure.
pub const TCP_RETRY_MS: u64 = 1000;

/// Default URL of a remote blendshape service.
pub const INFERENCE_URL: &str = "http://127.0.0.1:7777/audio_to_blendshapes";

/// Default timeout for remote inference requests, in seconds.
pub const INFERENCE_TIMEOUT_SECS: u64 = 30;

/// Directory name (under the data dir) for persisted artifacts.
pub const ARTIFACTS_DIR: &str = "generated";

/// Capacity of the playback report channel handed to observers.
pub const REPORT_BUFFER: usize = 64;

/// Longest a playback session waits for its channels to finish setup before starting.
pub const PLAYBACK_READY_TIMEOUT_MS: u64 = 2000;

/// How often a waiting playback worker checks whether the idle loop should resume.
pub const IDLE_RESUME_POLL_MS: u64 = 100;

/// Frames for a blend window of `secs` seconds at `fps`, rounded to nearest.
pub fn blend_frames(secs: f32, fps: u32) -> usize {
    (secs * fps as f32).round() as usize
}
