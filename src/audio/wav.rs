//! WAV decoding for inference and playback.

use crate::error::{FacelinkError, Result};
use std::io::Cursor;
use std::time::Duration;

/// Decoded PCM audio, samples normalized to [-1.0, 1.0] and interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Number of sample frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Average all channels into one.
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Remix to `out_channels` and resample to `out_rate`, interleaved.
    ///
    /// Mono is duplicated to every output channel; otherwise channels are
    /// mapped by index and missing ones repeat the last source channel.
    pub fn convert(&self, out_rate: u32, out_channels: u16) -> Vec<f32> {
        let in_channels = self.channels.max(1) as usize;
        let out_channels = out_channels.max(1) as usize;

        let planes: Vec<Vec<f32>> = (0..in_channels)
            .map(|c| {
                let plane: Vec<f32> = self
                    .samples
                    .iter()
                    .skip(c)
                    .step_by(in_channels)
                    .copied()
                    .collect();
                resample(&plane, self.sample_rate, out_rate)
            })
            .collect();

        let frames = planes.first().map_or(0, Vec::len);
        let mut out = Vec::with_capacity(frames * out_channels);
        for i in 0..frames {
            for c in 0..out_channels {
                let src = c.min(in_channels - 1);
                out.push(planes[src][i]);
            }
        }
        out
    }
}

/// Decode a WAV container held in memory.
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| {
        FacelinkError::AudioPlayback {
            message: format!("Failed to parse WAV data: {}", e),
        }
    })?;

    let spec = reader.spec();
    let read_err = |e: hound::Error| FacelinkError::AudioPlayback {
        message: format!("Failed to read WAV samples: {}", e),
    };

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(read_err)?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(read_err)?
        }
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Encode mono 16-bit PCM as a WAV container.
pub fn encode_pcm16(sample_rate: u32, samples: &[i16]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let to_err = |e: hound::Error| FacelinkError::Other(format!("Failed to write WAV: {}", e));
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(to_err)?;
    for &s in samples {
        writer.write_sample(s).map_err(to_err)?;
    }
    writer.finalize().map_err(to_err)?;
    Ok(cursor.into_inner())
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}
