//! JSON message protocol for IPC communication between CLI and daemon.
//!
//! One JSON object per line. Audio travels as standard base64 of the WAV bytes.

use crate::pipeline::SchedulerStatus;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Commands sent by CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Queue a clip for animated playback
    Submit { audio: String },
    /// Drop every queued clip
    Clear,
    /// Get queue depths and counters
    Status,
    /// Generate frames without playing them
    Shapes { audio: String },
    /// Shutdown the daemon
    Shutdown,
}

impl Command {
    pub fn submit(audio: &[u8]) -> Self {
        Command::Submit {
            audio: encode_audio(audio),
        }
    }

    pub fn shapes(audio: &[u8]) -> Self {
        Command::Shapes {
            audio: encode_audio(audio),
        }
    }

    /// Serialize command to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize command from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Responses sent by daemon to CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Command succeeded
    Ok,
    /// Clip admitted with this sequence id
    Queued { id: u64 },
    /// Items removed from the ingestion and prepared queues
    Cleared { requests: usize, clips: usize },
    /// Current scheduler status
    Status {
        #[serde(flatten)]
        status: SchedulerStatus,
    },
    /// 68 values per frame; empty when the clip was too short
    Blendshapes { frames: Vec<Vec<f32>> },
    /// Error occurred
    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    /// Serialize response to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

pub fn encode_audio(audio: &[u8]) -> String {
    STANDARD.encode(audio)
}

pub fn decode_audio(audio: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(audio.trim())
}
