//! Self-contained energy-envelope backend.
//!
//! Features are short-time RMS energy and its slope on a half-overlapped
//! analysis grid, averaged in pairs down to one row per 60 fps tick. The
//! model drives jaw and lip channels from loudness, which is enough for a
//! plausible talking mouth without an external service.

use super::{FeatureExtractor, FeatureFrames, SequenceModel};
use crate::audio::wav;
use crate::defaults::{ANALYSIS_FRAME_SECS, MIN_ANALYSIS_FRAMES, OUTPUT_DIM, WINDOW_SIZE};
use crate::error::Result;
use crate::frame::{
    JAW_OPEN, MOUTH_CLOSE, MOUTH_FUNNEL, MOUTH_LOWER_DOWN_LEFT, MOUTH_LOWER_DOWN_RIGHT, NEUTRAL,
};

/// Feature layout of one row.
const FEATURE_RAW: usize = 0;
const FEATURE_NORM: usize = 1;
const FEATURE_DELTA: usize = 2;

/// RMS level treated as a fully open jaw.
const FULL_OPEN_RMS: f32 = 0.25;

#[derive(Debug, Clone)]
pub struct EnvelopeExtractor {
    frame_secs: f32,
    min_frames: usize,
}

impl Default for EnvelopeExtractor {
    fn default() -> Self {
        Self {
            frame_secs: ANALYSIS_FRAME_SECS,
            min_frames: MIN_ANALYSIS_FRAMES,
        }
    }
}

impl EnvelopeExtractor {
    /// Analysis frame and hop length in samples for a sample rate.
    pub fn frame_geometry(&self, sample_rate: u32) -> (usize, usize) {
        let frame_length = ((self.frame_secs * sample_rate as f32) as usize).max(2);
        (frame_length, frame_length / 2)
    }

    /// Analysis frames that fit into `samples` at the given geometry.
    pub fn analysis_frame_count(samples: usize, frame_length: usize, hop: usize) -> usize {
        if samples < frame_length || hop == 0 {
            return 0;
        }
        (samples - frame_length) / hop + 1
    }
}

impl FeatureExtractor for EnvelopeExtractor {
    fn extract(&self, audio: &[u8]) -> Result<Option<FeatureFrames>> {
        let decoded = wav::decode(audio)?;
        let mono = decoded.to_mono();
        let (frame_length, hop) = self.frame_geometry(decoded.sample_rate);

        let count = Self::analysis_frame_count(mono.len(), frame_length, hop);
        if count < self.min_frames {
            tracing::info!(
                frames = count,
                required = self.min_frames,
                "audio too short for feature extraction"
            );
            return Ok(None);
        }

        let rms: Vec<f32> = (0..count)
            .map(|i| {
                let window = &mono[i * hop..i * hop + frame_length];
                (window.iter().map(|s| s * s).sum::<f32>() / frame_length as f32).sqrt()
            })
            .collect();

        let norm = mean_variance_normalize(&rms);
        let delta = slope(&norm);

        let rows: Vec<Vec<f32>> = (0..count)
            .map(|i| {
                let mut row = vec![0.0; 3];
                row[FEATURE_RAW] = rms[i];
                row[FEATURE_NORM] = norm[i];
                row[FEATURE_DELTA] = delta[i];
                row
            })
            .collect();

        Ok(Some(FeatureFrames::new(reduce_pairs(&rows))))
    }
}

/// Zero-mean, unit-variance over time.
fn mean_variance_normalize(values: &[f32]) -> Vec<f32> {
    let n = values.len().max(1) as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let std = var.sqrt();
    values.iter().map(|v| (v - mean) / (std + 1e-10)).collect()
}

/// Central difference with clamped edges.
fn slope(values: &[f32]) -> Vec<f32> {
    let n = values.len();
    (0..n)
        .map(|i| {
            let prev = values[i.saturating_sub(1)];
            let next = values[(i + 1).min(n - 1)];
            (next - prev) / 2.0
        })
        .collect()
}

/// Average adjacent rows; an odd last row is kept as is.
pub fn reduce_pairs(rows: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let mut reduced: Vec<Vec<f32>> = rows
        .chunks_exact(2)
        .map(|pair| {
            pair[0]
                .iter()
                .zip(&pair[1])
                .map(|(a, b)| (a + b) / 2.0)
                .collect()
        })
        .collect();
    if rows.len() % 2 == 1
        && let Some(last) = rows.last()
    {
        reduced.push(last.clone());
    }
    reduced
}

/// Loudness-driven mouth model producing 68-channel frames on the 0-100 scale.
#[derive(Debug, Clone)]
pub struct EnvelopeModel {
    window_size: usize,
}

impl EnvelopeModel {
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }
}

impl Default for EnvelopeModel {
    fn default() -> Self {
        Self::new(WINDOW_SIZE)
    }
}

impl SequenceModel for EnvelopeModel {
    fn window_size(&self) -> usize {
        self.window_size
    }

    fn infer_window(&self, window: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        Ok(window
            .iter()
            .map(|row| {
                let level = (row[FEATURE_RAW] / FULL_OPEN_RMS).clamp(0.0, 1.0);
                let attack = row[FEATURE_DELTA].clamp(0.0, 1.0);

                let mut out = vec![0.0; OUTPUT_DIM];
                out[JAW_OPEN] = 100.0 * level;
                out[MOUTH_LOWER_DOWN_LEFT] = 60.0 * level;
                out[MOUTH_LOWER_DOWN_RIGHT] = 60.0 * level;
                out[MOUTH_FUNNEL] = 30.0 * attack;
                out[MOUTH_CLOSE] = 20.0 * (1.0 - level);
                out[NEUTRAL] = 1.0;
                out
            })
            .collect())
    }

    fn name(&self) -> &str {
        "envelope"
    }
}
