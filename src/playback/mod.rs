//! Synchronized dual-channel playback.

pub mod session;
pub mod signal;

pub use session::{PlaybackSession, SessionOutcome, SyncPlayer};
pub use signal::{StartSignal, StartTrigger};
