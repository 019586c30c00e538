//! Blend envelopes at clip boundaries.
//!
//! The first `blend_in` frames fade from the idle baseline into the generated
//! animation and the last `blend_out` frames fade back, so the face never
//! jumps when a clip starts or ends. Only facial channels are blended.

use super::livelink::{FrameEncoder, FrameTime};
use crate::defaults::{BLEND_IN_SECS, BLEND_OUT_SECS, blend_frames};
use crate::error::EncodeError;
use crate::frame::{BLENDED_CHANNELS, EMOTIONS, Frame, FrameSequence, dominant_emotion};
use std::sync::Arc;

#[derive(Clone)]
pub struct BlendEncoder {
    encoder: Arc<dyn FrameEncoder>,
    baseline: Frame,
    fps: u32,
    blend_in: usize,
    blend_out: usize,
}

impl BlendEncoder {
    pub fn new(
        encoder: Arc<dyn FrameEncoder>,
        baseline: Frame,
        fps: u32,
    ) -> Result<Self, EncodeError> {
        if fps == 0 {
            return Err(EncodeError::ZeroFrameRate);
        }
        Ok(Self {
            encoder,
            baseline,
            fps,
            blend_in: blend_frames(BLEND_IN_SECS, fps),
            blend_out: blend_frames(BLEND_OUT_SECS, fps),
        })
    }

    pub fn blend_in(&self) -> usize {
        self.blend_in
    }

    pub fn blend_out(&self) -> usize {
        self.blend_out
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Apply both envelopes. Output has the same length as the input.
    pub fn blend(&self, sequence: &FrameSequence) -> Result<Vec<Frame>, EncodeError> {
        let frames = sequence.frames();
        let n = frames.len();
        if n <= self.blend_in + self.blend_out {
            return Err(EncodeError::TooShort {
                frames: n,
                blend_in: self.blend_in,
                blend_out: self.blend_out,
            });
        }

        let mut out = frames.to_vec();
        for (k, frame) in out.iter_mut().take(self.blend_in).enumerate() {
            let w = k as f32 / self.blend_in as f32;
            self.mix(frame, w);
        }
        let tail = n - self.blend_out;
        for (k, frame) in out[tail..].iter_mut().enumerate() {
            let w = 1.0 - k as f32 / self.blend_out as f32;
            self.mix(frame, w);
        }
        Ok(out)
    }

    /// Blend and serialize, frame `k` stamped `start + k / fps`.
    pub fn encode(
        &self,
        sequence: &FrameSequence,
        start: FrameTime,
    ) -> Result<Vec<Vec<u8>>, EncodeError> {
        let blended = self.blend(sequence)?;
        self.log_emotions(&blended);
        Ok(blended
            .iter()
            .enumerate()
            .map(|(k, frame)| self.encoder.encode(frame, start.advance(k)))
            .collect())
    }

    /// `w` is the weight of the generated frame against the baseline.
    fn mix(&self, frame: &mut Frame, w: f32) {
        for (value, base) in frame[..BLENDED_CHANNELS]
            .iter_mut()
            .zip(&self.baseline[..BLENDED_CHANNELS])
        {
            *value = (1.0 - w) * base + w * *value;
        }
    }

    fn log_emotions(&self, frames: &[Frame]) {
        let n = frames.len();
        let mut histogram = [0usize; EMOTIONS.len()];
        for (k, frame) in frames.iter().enumerate() {
            let (emotion, score) = dominant_emotion(frame);
            if let Some(idx) = EMOTIONS.iter().position(|e| *e == emotion) {
                histogram[idx] += 1;
            }
            if k < self.blend_in || k >= n - self.blend_out {
                tracing::trace!(frame = k, emotion, score, "blended frame");
            }
        }

        let summary: Vec<String> = EMOTIONS
            .iter()
            .zip(histogram)
            .filter(|(_, count)| *count > 0)
            .map(|(name, count)| format!("{name}={count}"))
            .collect();
        tracing::debug!(frames = n, emotions = %summary.join(" "), "encoded sequence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::OUTPUT_DIM;
    use crate::encode::livelink::MockEncoder;

    fn encoder() -> BlendEncoder {
        let mut baseline = [0.0; OUTPUT_DIM];
        baseline[..BLENDED_CHANNELS].fill(0.2);
        BlendEncoder::new(Arc::new(MockEncoder), baseline, 60).unwrap()
    }

    fn constant(n: usize, value: f32) -> FrameSequence {
        FrameSequence::new(vec![[value; OUTPUT_DIM]; n])
    }

    #[test]
    fn windows_at_sixty_fps() {
        let enc = encoder();
        assert_eq!(enc.blend_in(), 6);
        assert_eq!(enc.blend_out(), 18);
    }

    #[test]
    fn zero_fps_rejected() {
        let result = BlendEncoder::new(Arc::new(MockEncoder), [0.0; OUTPUT_DIM], 0);
        assert!(matches!(result, Err(EncodeError::ZeroFrameRate)));
    }

    #[test]
    fn length_threshold() {
        let enc = encoder();
        assert!(matches!(
            enc.blend(&constant(24, 1.0)),
            Err(EncodeError::TooShort {
                frames: 24,
                blend_in: 6,
                blend_out: 18
            })
        ));
        assert_eq!(enc.blend(&constant(25, 1.0)).unwrap().len(), 25);
        assert_eq!(enc.blend(&constant(30, 1.0)).unwrap().len(), 30);
    }

    #[test]
    fn blend_in_ramps_from_baseline() {
        let enc = encoder();
        let out = enc.blend(&constant(100, 1.0)).unwrap();

        assert!((out[0][0] - 0.2).abs() < 1e-6);
        assert!((out[3][0] - 0.6).abs() < 1e-6);
        // First fully generated frame
        assert_eq!(out[6][0], 1.0);
        assert_eq!(out[50][0], 1.0);
    }

    #[test]
    fn blend_out_decays_toward_baseline() {
        let enc = encoder();
        let out = enc.blend(&constant(100, 1.0)).unwrap();

        assert_eq!(out[82][0], 1.0);
        assert!((out[91][0] - 0.6).abs() < 1e-6);
        let last = 1.0 / 18.0 * 1.0 + 17.0 / 18.0 * 0.2;
        assert!((out[99][0] - last).abs() < 1e-6);
    }

    #[test]
    fn ramp_middle_frames_pass_through_exactly() {
        let enc = encoder();
        let ramp: Vec<Frame> = (0..30)
            .map(|k| {
                let mut frame = [0.0; OUTPUT_DIM];
                for (c, value) in frame.iter_mut().enumerate() {
                    *value = k as f32 * 0.03 + c as f32 * 0.001;
                }
                frame
            })
            .collect();
        let out = enc.blend(&FrameSequence::new(ramp.clone())).unwrap();

        for k in 6..=12 {
            assert_eq!(out[k][..BLENDED_CHANNELS], ramp[k][..BLENDED_CHANNELS], "frame {k}");
        }
        for k in 0..6 {
            let w = k as f32 / 6.0;
            let expected = (1.0 - w) * 0.2 + w * ramp[k][7];
            assert!((out[k][7] - expected).abs() < 1e-6, "frame {k}");
        }
        for k in 12..30 {
            let w = 1.0 - (k - 12) as f32 / 18.0;
            let expected = (1.0 - w) * 0.2 + w * ramp[k][7];
            assert!((out[k][7] - expected).abs() < 1e-6, "frame {k}");
        }
        for k in 0..30 {
            assert_eq!(out[k][BLENDED_CHANNELS..], ramp[k][BLENDED_CHANNELS..]);
        }
    }

    #[test]
    fn unblended_channels_copied() {
        let enc = encoder();
        let out = enc.blend(&constant(40, 0.9)).unwrap();
        assert_eq!(out[0][BLENDED_CHANNELS], 0.9);
        assert_eq!(out[0][OUTPUT_DIM - 1], 0.9);
        assert!(out[39][BLENDED_CHANNELS - 1] < 0.9);
    }

    #[test]
    fn encode_stamps_consecutive_frames() {
        let enc = encoder();
        let packets = enc
            .encode(&constant(30, 1.0), FrameTime { frame: 500, sub_frame: 0.0 })
            .unwrap();
        assert_eq!(packets.len(), 30);
        let numbers: Vec<u32> = packets
            .iter()
            .map(|p| MockEncoder::decode(p).unwrap().0)
            .collect();
        assert_eq!(numbers, (500..530).collect::<Vec<_>>());
    }

    #[test]
    fn too_short_encodes_nothing() {
        let enc = encoder();
        assert!(enc.encode(&constant(10, 1.0), FrameTime::default()).is_err());
    }
}
