//! Animation frame layout and the frame sequence produced per request.

use crate::defaults::OUTPUT_DIM;

/// One animation frame: 68 channel intensities.
pub type Frame = [f32; OUTPUT_DIM];

/// Channels 0..51 are facial blendshapes and take part in blend envelopes.
pub const BLENDED_CHANNELS: usize = 51;

/// Channels 0..61 are animation channels: rescaled and sent on the wire.
pub const ANIMATION_CHANNELS: usize = 61;

/// First emotion score channel.
pub const EMOTION_START: usize = ANIMATION_CHANNELS;

pub const EMOTIONS: [&str; 7] = [
    "Angry",
    "Disgusted",
    "Fearful",
    "Happy",
    "Neutral",
    "Sad",
    "Surprised",
];

/// Column names for all 68 channels, in channel order.
pub const CHANNEL_NAMES: [&str; OUTPUT_DIM] = [
    "EyeBlinkLeft",
    "EyeLookDownLeft",
    "EyeLookInLeft",
    "EyeLookOutLeft",
    "EyeLookUpLeft",
    "EyeSquintLeft",
    "EyeWideLeft",
    "EyeBlinkRight",
    "EyeLookDownRight",
    "EyeLookInRight",
    "EyeLookOutRight",
    "EyeLookUpRight",
    "EyeSquintRight",
    "EyeWideRight",
    "JawForward",
    "JawRight",
    "JawLeft",
    "JawOpen",
    "MouthClose",
    "MouthFunnel",
    "MouthPucker",
    "MouthRight",
    "MouthLeft",
    "MouthSmileLeft",
    "MouthSmileRight",
    "MouthFrownLeft",
    "MouthFrownRight",
    "MouthDimpleLeft",
    "MouthDimpleRight",
    "MouthStretchLeft",
    "MouthStretchRight",
    "MouthRollLower",
    "MouthRollUpper",
    "MouthShrugLower",
    "MouthShrugUpper",
    "MouthPressLeft",
    "MouthPressRight",
    "MouthLowerDownLeft",
    "MouthLowerDownRight",
    "MouthUpperUpLeft",
    "MouthUpperUpRight",
    "BrowDownLeft",
    "BrowDownRight",
    "BrowInnerUp",
    "BrowOuterUpLeft",
    "BrowOuterUpRight",
    "CheekPuff",
    "CheekSquintLeft",
    "CheekSquintRight",
    "NoseSneerLeft",
    "NoseSneerRight",
    "TongueOut",
    "HeadYaw",
    "HeadPitch",
    "HeadRoll",
    "LeftEyeYaw",
    "LeftEyePitch",
    "LeftEyeRoll",
    "RightEyeYaw",
    "RightEyePitch",
    "RightEyeRoll",
    "Angry",
    "Disgusted",
    "Fearful",
    "Happy",
    "Neutral",
    "Sad",
    "Surprised",
];

pub const JAW_OPEN: usize = 17;
pub const MOUTH_CLOSE: usize = 18;
pub const MOUTH_FUNNEL: usize = 19;
pub const MOUTH_LOWER_DOWN_LEFT: usize = 37;
pub const MOUTH_LOWER_DOWN_RIGHT: usize = 38;
pub const NEUTRAL: usize = EMOTION_START + 4;

/// Returns the dominant emotion of a frame and its score.
pub fn dominant_emotion(frame: &Frame) -> (&'static str, f32) {
    let mut best = 0;
    for i in 1..EMOTIONS.len() {
        if frame[EMOTION_START + i] > frame[EMOTION_START + best] {
            best = i;
        }
    }
    (EMOTIONS[best], frame[EMOTION_START + best])
}

/// Ordered animation frames for one request; frame `i` is 60 fps tick `i`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameSequence {
    frames: Vec<Frame>,
}

impl FrameSequence {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Playback duration at the given frame rate.
    pub fn duration(&self, fps: u32) -> std::time::Duration {
        if fps == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.frames.len() as f64 / fps as f64)
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    /// Frames as nested vectors, for JSON responses.
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.frames.iter().map(|f| f.to_vec()).collect()
    }
}
