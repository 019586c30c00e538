//! facelink - Audio-driven facial animation streaming
//!
//! Turns queued speech clips into 68-channel blendshape animation, then plays
//! each clip's audio and its animation stream together, falling back to an
//! idle loop whenever nothing is queued.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod artifacts;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod daemon;
pub mod defaults;
pub mod encode;
pub mod error;
pub mod frame;
pub mod idle;
pub mod inference;
pub mod ipc;
pub mod pipeline;
pub mod playback;
pub mod transport;

// Capability traits (generate → encode → play)
pub use audio::AudioPlayer;
pub use encode::FrameEncoder;
pub use inference::AnimationGenerator;
pub use transport::FrameTransport;

// Pipeline
pub use pipeline::{PlaybackOutcome, PlaybackReport, Scheduler, SchedulerStatus};

// Error handling
pub use error::{EncodeError, FacelinkError, Result};

// Config
pub use config::Config;

// Station framework (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};
pub use pipeline::station::Station;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_hash_suffix() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "Git hash should be 7 chars, got: {}", ver);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
