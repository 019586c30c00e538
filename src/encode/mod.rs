//! Frame sequences to wire packets.

pub mod blend;
pub mod livelink;

pub use blend::BlendEncoder;
pub use livelink::{FrameEncoder, FrameTime, LiveLinkEncoder, MockEncoder};
