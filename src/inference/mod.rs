//! Audio to animation-frame inference.
//!
//! The pipeline only sees [`AnimationGenerator`]. Local backends are built by
//! pairing a [`FeatureExtractor`] with a [`SequenceModel`] inside a
//! [`WindowedGenerator`]; remote backends implement the generator directly.

pub mod envelope;
pub mod mock;
#[cfg(feature = "http")]
pub mod remote;
pub mod window;

pub use envelope::{EnvelopeExtractor, EnvelopeModel};
pub use mock::MockGenerator;
#[cfg(feature = "http")]
pub use remote::HttpGenerator;
pub use window::{WindowedGenerator, reflect_pad};

use crate::config::{InferenceBackend, InferenceConfig};
use crate::error::{FacelinkError, Result};
use std::sync::Arc;

/// Time-major feature matrix: one row per 60 fps tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureFrames {
    pub rows: Vec<Vec<f32>>,
}

impl FeatureFrames {
    pub fn new(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Raw model output before post-processing.
///
/// Shape is `[frames, width]` or a batch `[batch, frames, width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl RawTensor {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        if shape.len() != 2 && shape.len() != 3 {
            return Err(FacelinkError::Inference {
                message: format!("expected a rank 2 or 3 tensor, got rank {}", shape.len()),
            });
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(FacelinkError::Inference {
                message: format!(
                    "tensor shape {:?} needs {} values, got {}",
                    shape,
                    expected,
                    data.len()
                ),
            });
        }
        Ok(Self { data, shape })
    }

    /// Build a `[frames, width]` tensor from equal-width rows.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let width = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(FacelinkError::ShapeMismatch {
                expected: width,
                actual: bad.len(),
            });
        }
        let frames = rows.len();
        let data = rows.into_iter().flatten().collect();
        Self::new(data, vec![frames, width])
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Channels per frame (last dimension).
    pub fn width(&self) -> usize {
        self.shape.last().copied().unwrap_or(0)
    }

    /// Frame count after collapsing any batch dimension.
    pub fn frames(&self) -> usize {
        self.shape[..self.shape.len() - 1].iter().product()
    }
}

/// Turns decoded audio into model input features.
pub trait FeatureExtractor: Send + Sync {
    /// Returns `Ok(None)` when the clip is too short to analyse.
    fn extract(&self, audio: &[u8]) -> Result<Option<FeatureFrames>>;
}

/// Maps one fixed-length window of features to animation frames.
pub trait SequenceModel: Send + Sync {
    /// Time steps per window.
    fn window_size(&self) -> usize;

    /// Run one full window; output has one row per input row.
    fn infer_window(&self, window: &[Vec<f32>]) -> Result<Vec<Vec<f32>>>;

    fn name(&self) -> &str;
}

/// Audio bytes in, raw animation frames out.
pub trait AnimationGenerator: Send + Sync {
    /// Returns `Ok(None)` for insufficient input.
    fn generate(&self, audio: &[u8]) -> Result<Option<RawTensor>>;

    fn name(&self) -> &str;
}

impl<T: AnimationGenerator + ?Sized> AnimationGenerator for Arc<T> {
    fn generate(&self, audio: &[u8]) -> Result<Option<RawTensor>> {
        (**self).generate(audio)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Construct the configured backend.
pub fn build_generator(config: &InferenceConfig) -> Result<Arc<dyn AnimationGenerator>> {
    match config.backend {
        InferenceBackend::Envelope => Ok(Arc::new(WindowedGenerator::new(
            EnvelopeExtractor::default(),
            EnvelopeModel::new(config.window_size),
        ))),
        #[cfg(feature = "http")]
        InferenceBackend::Http => Ok(Arc::new(HttpGenerator::new(
            &config.url,
            std::time::Duration::from_secs(config.timeout_secs),
        )?)),
        #[cfg(not(feature = "http"))]
        InferenceBackend::Http => Err(FacelinkError::ConfigInvalidValue {
            key: "inference.backend".to_string(),
            message: "built without the `http` feature".to_string(),
        }),
    }
}
