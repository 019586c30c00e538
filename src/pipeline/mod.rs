//! Animation pipeline.
//!
//! A preprocessing station turns queued audio into frames on its own thread;
//! the playback worker plays prepared clips one at a time, handing the
//! transport back to the idle loop in between. Stages are connected by
//! unbounded crossbeam channels so admission never blocks.

pub mod error;
pub mod post_processor;
pub mod preprocess;
pub mod scheduler;
pub mod station;
pub mod types;

pub use error::{ErrorReporter, LogReporter, StationError};
pub use post_processor::{PostProcessor, smooth_pairs};
pub use preprocess::{PreprocessStation, generate_frames};
pub use scheduler::Scheduler;
pub use station::{Station, StationRunner};
pub use types::{
    AudioRequest, Counters, Job, PlaybackOutcome, PlaybackReport, PreparedClip, SchedulerStatus,
};
