//! Rescaling and smoothing of raw model output.
//!
//! The model emits animation channels on a 0-100 scale; the rendering engine
//! expects 0-1. Emotion scores are already 0-1 and pass through untouched.

use crate::defaults::OUTPUT_DIM;
use crate::error::{FacelinkError, Result};
use crate::frame::{ANIMATION_CHANNELS, Frame, FrameSequence};
use crate::inference::RawTensor;

#[derive(Debug, Clone)]
pub struct PostProcessor {
    smoothing: bool,
}

impl PostProcessor {
    /// Fails when `output_dim` is not the 68-channel layout.
    pub fn new(output_dim: usize, smoothing: bool) -> Result<Self> {
        if output_dim != OUTPUT_DIM {
            return Err(FacelinkError::ShapeMismatch {
                expected: OUTPUT_DIM,
                actual: output_dim,
            });
        }
        Ok(Self { smoothing })
    }

    /// Flatten, rescale and optionally smooth a raw tensor.
    pub fn process(&self, raw: RawTensor) -> Result<FrameSequence> {
        if raw.width() != OUTPUT_DIM {
            return Err(FacelinkError::ShapeMismatch {
                expected: OUTPUT_DIM,
                actual: raw.width(),
            });
        }

        let mut frames: Vec<Frame> = raw
            .data()
            .chunks_exact(OUTPUT_DIM)
            .map(|chunk| {
                let mut frame = [0.0; OUTPUT_DIM];
                frame.copy_from_slice(chunk);
                for value in &mut frame[..ANIMATION_CHANNELS] {
                    *value /= 100.0;
                }
                frame
            })
            .collect();

        if self.smoothing {
            smooth_pairs(&mut frames);
        }
        Ok(FrameSequence::new(frames))
    }
}

/// Replace each frame with the mean of itself and its successor.
///
/// Uses the unsmoothed successor; the final frame has none and is kept.
pub fn smooth_pairs(frames: &mut [Frame]) {
    let n = frames.len();
    for i in 1..n {
        let next = frames[i];
        for (value, neighbour) in frames[i - 1].iter_mut().zip(next.iter()) {
            *value = (*value + neighbour) / 2.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(rows: &[[f32; 2]]) -> RawTensor {
        // Channel 0 (animation) and channel 67 (emotion) set per row
        let data: Vec<f32> = rows
            .iter()
            .flat_map(|[a, e]| {
                let mut row = vec![0.0; OUTPUT_DIM];
                row[0] = *a;
                row[OUTPUT_DIM - 1] = *e;
                row
            })
            .collect();
        RawTensor::new(data, vec![rows.len(), OUTPUT_DIM]).unwrap()
    }

    #[test]
    fn rejects_wrong_configured_dim() {
        assert!(matches!(
            PostProcessor::new(61, true),
            Err(FacelinkError::ShapeMismatch {
                expected: 68,
                actual: 61
            })
        ));
    }

    #[test]
    fn rejects_wrong_tensor_width() {
        let processor = PostProcessor::new(68, false).unwrap();
        let raw = RawTensor::new(vec![0.0; 2 * 61], vec![2, 61]).unwrap();
        assert!(matches!(
            processor.process(raw),
            Err(FacelinkError::ShapeMismatch { actual: 61, .. })
        ));
    }

    #[test]
    fn rescales_animation_channels_only() {
        let processor = PostProcessor::new(68, false).unwrap();
        let seq = processor.process(tensor(&[[50.0, 0.8]])).unwrap();
        let frame = seq.frames()[0];
        assert_eq!(frame[0], 0.5);
        assert_eq!(frame[OUTPUT_DIM - 1], 0.8);
    }

    #[test]
    fn channel_sixty_is_rescaled_sixty_one_is_not() {
        let processor = PostProcessor::new(68, false).unwrap();
        let raw = RawTensor::new(vec![100.0; OUTPUT_DIM], vec![1, OUTPUT_DIM]).unwrap();
        let frame = processor.process(raw).unwrap().frames()[0];
        assert_eq!(frame[60], 1.0);
        assert_eq!(frame[61], 100.0);
    }

    #[test]
    fn smoothing_uses_original_neighbours_and_keeps_last() {
        let processor = PostProcessor::new(68, true).unwrap();
        let seq = processor
            .process(tensor(&[[0.0, 0.0], [100.0, 0.0], [200.0, 0.0]]))
            .unwrap();
        let channel0: Vec<f32> = seq.frames().iter().map(|f| f[0]).collect();
        assert_eq!(channel0, vec![0.5, 1.5, 2.0]);
    }

    #[test]
    fn batch_tensor_is_flattened() {
        let processor = PostProcessor::new(68, false).unwrap();
        let raw = RawTensor::new(vec![10.0; 2 * 3 * OUTPUT_DIM], vec![2, 3, OUTPUT_DIM]).unwrap();
        let seq = processor.process(raw).unwrap();
        assert_eq!(seq.len(), 6);
        assert!((seq.frames()[5][0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn single_frame_smoothing_is_noop() {
        let processor = PostProcessor::new(68, true).unwrap();
        let seq = processor.process(tensor(&[[40.0, 0.3]])).unwrap();
        assert_eq!(seq.frames()[0][0], 0.4);
    }
}
