//! Error types for facelink.

use thiserror::Error;

/// Validation failures raised by the blend encoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error(
        "sequence of {frames} frames is too short for a {blend_in}+{blend_out} frame blend envelope"
    )]
    TooShort {
        frames: usize,
        blend_in: usize,
        blend_out: usize,
    },

    #[error("frame rate must be positive")]
    ZeroFrameRate,
}

#[derive(Error, Debug)]
pub enum FacelinkError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Model output shape errors (fatal, configuration level)
    #[error("Shape mismatch: expected {expected} channels per frame, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    // Inference errors
    #[error("Feature extraction failed: {message}")]
    FeatureExtraction { message: String },

    #[error("Inference failed: {message}")]
    Inference { message: String },

    // Encoding errors
    #[error("Encoding rejected: {0}")]
    Encode(#[from] EncodeError),

    // Playback errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    // Pipeline errors
    #[error("Pipeline is shutting down")]
    ShuttingDown,

    #[error("Pipeline worker failed: {message}")]
    Worker { message: String },

    // Artifact errors
    #[error("Artifact error: {message}")]
    Artifact { message: String },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FacelinkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_shape_mismatch_display() {
        let error = FacelinkError::ShapeMismatch {
            expected: 68,
            actual: 61,
        };
        assert_eq!(
            error.to_string(),
            "Shape mismatch: expected 68 channels per frame, got 61"
        );
    }

    #[test]
    fn test_encode_error_too_short_display() {
        let error = FacelinkError::from(EncodeError::TooShort {
            frames: 20,
            blend_in: 6,
            blend_out: 18,
        });
        assert_eq!(
            error.to_string(),
            "Encoding rejected: sequence of 20 frames is too short for a 6+18 frame blend envelope"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = FacelinkError::ConfigInvalidValue {
            key: "animation.frame_rate".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for animation.frame_rate: must be positive"
        );
    }

    #[test]
    fn test_audio_playback_display() {
        let error = FacelinkError::AudioPlayback {
            message: "unsupported WAV format".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio playback failed: unsupported WAV format"
        );
    }

    #[test]
    fn test_transport_display() {
        let error = FacelinkError::Transport {
            message: "connection refused".to_string(),
        };
        assert_eq!(error.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn test_shutting_down_display() {
        assert_eq!(
            FacelinkError::ShuttingDown.to_string(),
            "Pipeline is shutting down"
        );
    }

    #[test]
    fn test_ipc_protocol_display() {
        let error = FacelinkError::IpcProtocol {
            message: "invalid message format".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "IPC protocol error: invalid message format"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: FacelinkError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: FacelinkError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: FacelinkError = io_error.into();
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<FacelinkError>();
        assert_sync::<FacelinkError>();
    }
}
