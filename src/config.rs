use crate::defaults;
use crate::error::{FacelinkError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub animation: AnimationConfig,
    pub inference: InferenceConfig,
    pub transport: TransportConfig,
    pub audio: AudioConfig,
    pub idle: IdleConfig,
    pub artifacts: ArtifactsConfig,
}

/// Frame cadence and post-processing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnimationConfig {
    pub frame_rate: u32,
    pub output_dim: usize,
    pub smoothing: bool,
    pub pacing: Pacing,
}

/// How the network channel keeps its cadence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Sleep one frame interval after every send.
    #[default]
    Fixed,
    /// Sleep until the frame's deadline measured from the start signal.
    Deadline,
}

/// Which animation generator backs the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InferenceConfig {
    pub backend: InferenceBackend,
    pub url: String,
    pub timeout_secs: u64,
    pub window_size: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InferenceBackend {
    /// Built-in energy envelope model (no external service).
    #[default]
    Envelope,
    /// Remote blendshape service over HTTP.
    Http,
}

/// Connection to the rendering engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    pub protocol: TransportProtocol,
    pub address: String,
    pub subject_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportProtocol {
    #[default]
    Udp,
    Tcp,
}

/// Local audio output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub device: Option<String>,
}

/// Idle animation shown between sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct IdleConfig {
    /// shapes.csv file to loop; the neutral pose is used when unset.
    pub clip: Option<PathBuf>,
}

/// Persisted audio + shapes per request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            frame_rate: defaults::FRAME_RATE,
            output_dim: defaults::OUTPUT_DIM,
            smoothing: true,
            pacing: Pacing::Fixed,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: InferenceBackend::Envelope,
            url: defaults::INFERENCE_URL.to_string(),
            timeout_secs: defaults::INFERENCE_TIMEOUT_SECS,
            window_size: defaults::WINDOW_SIZE,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            protocol: TransportProtocol::Udp,
            address: defaults::TRANSPORT_ADDR.to_string(),
            subject_name: defaults::SUBJECT_NAME.to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: None,
        }
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl ArtifactsConfig {
    /// Configured directory, or `generated/` under the user data dir.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("facelink")
                .join(defaults::ARTIFACTS_DIR)
        })
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if the file doesn't exist.
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                let missing = e
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound);
                if missing {
                    Ok(Self::default())
                } else {
                    Err(e.context(format!("Failed to load config from {}", path.display())))
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - FACELINK_TRANSPORT_ADDR → transport.address
    /// - FACELINK_AUDIO_DEVICE → audio.device
    /// - FACELINK_INFERENCE_URL → inference.url
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = std::env::var("FACELINK_TRANSPORT_ADDR")
            && !addr.is_empty()
        {
            self.transport.address = addr;
        }

        if let Ok(device) = std::env::var("FACELINK_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(url) = std::env::var("FACELINK_INFERENCE_URL")
            && !url.is_empty()
        {
            self.inference.url = url;
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// These are configuration-level failures and abort startup.
    pub fn validate(&self) -> Result<()> {
        if self.animation.output_dim != defaults::OUTPUT_DIM {
            return Err(FacelinkError::ShapeMismatch {
                expected: defaults::OUTPUT_DIM,
                actual: self.animation.output_dim,
            });
        }
        if self.animation.frame_rate == 0 {
            return Err(FacelinkError::ConfigInvalidValue {
                key: "animation.frame_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.inference.window_size == 0 {
            return Err(FacelinkError::ConfigInvalidValue {
                key: "inference.window_size".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.transport.address.is_empty() {
            return Err(FacelinkError::ConfigInvalidValue {
                key: "transport.address".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/facelink/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facelink")
            .join("config.toml")
    }
}
