//! Fixed-window inference over arbitrarily long feature sequences.

use super::{AnimationGenerator, FeatureExtractor, RawTensor, SequenceModel};
use crate::error::{FacelinkError, Result};

/// Mirror-pad `rows` to `size` rows without repeating the edge row.
///
/// Pads longer than the input keep bouncing between both ends, so the
/// result matches a reflect pad at any length. A single row is repeated.
pub fn reflect_pad(rows: &[Vec<f32>], size: usize) -> Vec<Vec<f32>> {
    let n = rows.len();
    if n == 0 || n >= size {
        return rows.to_vec();
    }

    let mut padded = rows.to_vec();
    padded.reserve(size - n);
    for p in n..size {
        let idx = if n == 1 {
            0
        } else {
            let period = 2 * (n - 1);
            let m = p % period;
            if m < n { m } else { period - m }
        };
        padded.push(rows[idx].clone());
    }
    padded
}

/// Runs a [`SequenceModel`] window by window over extracted features.
pub struct WindowedGenerator<E, M> {
    extractor: E,
    model: M,
}

impl<E: FeatureExtractor, M: SequenceModel> WindowedGenerator<E, M> {
    pub fn new(extractor: E, model: M) -> Self {
        Self { extractor, model }
    }

    /// Window the features, pad each short window, infer, truncate, concatenate.
    pub fn infer(&self, features: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        let window_size = self.model.window_size();
        if window_size == 0 {
            return Err(FacelinkError::Inference {
                message: "model window size is zero".to_string(),
            });
        }

        let mut output = Vec::with_capacity(features.len());
        for chunk in features.chunks(window_size) {
            let window = reflect_pad(chunk, window_size);
            let mut decoded = self.model.infer_window(&window)?;
            if decoded.len() < chunk.len() {
                return Err(FacelinkError::Inference {
                    message: format!(
                        "model returned {} frames for a {} frame window",
                        decoded.len(),
                        chunk.len()
                    ),
                });
            }
            decoded.truncate(chunk.len());
            output.extend(decoded);
        }
        Ok(output)
    }
}

impl<E: FeatureExtractor, M: SequenceModel> AnimationGenerator for WindowedGenerator<E, M> {
    fn generate(&self, audio: &[u8]) -> Result<Option<RawTensor>> {
        let Some(features) = self.extractor.extract(audio)? else {
            return Ok(None);
        };
        if features.is_empty() {
            return Ok(None);
        }

        let rows = self.infer(&features.rows)?;
        tracing::debug!(
            model = self.model.name(),
            feature_frames = features.len(),
            output_frames = rows.len(),
            "inference complete"
        );
        RawTensor::from_rows(rows).map(Some)
    }

    fn name(&self) -> &str {
        self.model.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::FeatureFrames;
    use std::sync::Mutex;

    fn rows(values: &[f32]) -> Vec<Vec<f32>> {
        values.iter().map(|&v| vec![v]).collect()
    }

    fn flat(rows: &[Vec<f32>]) -> Vec<f32> {
        rows.iter().map(|r| r[0]).collect()
    }

    #[test]
    fn reflect_pad_short() {
        let padded = reflect_pad(&rows(&[1.0, 2.0, 3.0]), 5);
        assert_eq!(flat(&padded), vec![1.0, 2.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn reflect_pad_longer_than_input() {
        let padded = reflect_pad(&rows(&[1.0, 2.0, 3.0]), 9);
        assert_eq!(
            flat(&padded),
            vec![1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0, 2.0, 1.0]
        );
    }

    #[test]
    fn reflect_pad_single_row_repeats() {
        let padded = reflect_pad(&rows(&[4.0]), 3);
        assert_eq!(flat(&padded), vec![4.0, 4.0, 4.0]);
    }

    #[test]
    fn reflect_pad_full_window_unchanged() {
        let input = rows(&[1.0, 2.0]);
        assert_eq!(reflect_pad(&input, 2), input);
    }

    struct Passthrough;

    impl FeatureExtractor for Passthrough {
        fn extract(&self, audio: &[u8]) -> Result<Option<FeatureFrames>> {
            if audio.is_empty() {
                return Ok(None);
            }
            Ok(Some(FeatureFrames::new(
                audio.iter().map(|&b| vec![b as f32]).collect(),
            )))
        }
    }

    /// Echoes the input feature into channel 0 and records window sizes.
    struct EchoModel {
        window: usize,
        seen: Mutex<Vec<Vec<f32>>>,
    }

    impl SequenceModel for EchoModel {
        fn window_size(&self) -> usize {
            self.window
        }

        fn infer_window(&self, window: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
            self.seen.lock().unwrap().push(flat(window));
            Ok(window
                .iter()
                .map(|r| {
                    let mut out = vec![0.0; 68];
                    out[0] = r[0];
                    out
                })
                .collect())
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn windows_are_padded_then_truncated() {
        let generator = WindowedGenerator::new(
            Passthrough,
            EchoModel {
                window: 4,
                seen: Mutex::new(Vec::new()),
            },
        );

        let tensor = generator.generate(&[1, 2, 3, 4, 5, 6]).unwrap().unwrap();
        assert_eq!(tensor.shape(), &[6, 68]);

        let channel0: Vec<f32> = tensor.data().chunks(68).map(|f| f[0]).collect();
        assert_eq!(channel0, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let seen = generator.model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(seen[1], vec![5.0, 6.0, 5.0, 6.0]);
    }

    #[test]
    fn insufficient_features_yield_none() {
        let generator = WindowedGenerator::new(
            Passthrough,
            EchoModel {
                window: 4,
                seen: Mutex::new(Vec::new()),
            },
        );
        assert!(generator.generate(&[]).unwrap().is_none());
    }
}
