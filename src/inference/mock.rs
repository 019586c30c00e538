use super::{AnimationGenerator, RawTensor};
use crate::defaults::OUTPUT_DIM;
use crate::error::{FacelinkError, Result};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mock generator for testing
///
/// Produces `frames` copies of one row. Channel 0 of every row carries the
/// first audio byte so tests can tell requests apart after post-processing.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    frames: usize,
    width: usize,
    min_bytes: usize,
    should_fail: bool,
    gate: Option<Receiver<()>>,
    calls: Arc<AtomicUsize>,
}

impl MockGenerator {
    pub fn new(frames: usize) -> Self {
        Self {
            frames,
            width: OUTPUT_DIM,
            min_bytes: 0,
            should_fail: false,
            gate: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Audio shorter than `min_bytes` is reported as insufficient.
    pub fn with_min_bytes(mut self, min_bytes: usize) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    /// Emit rows of the wrong width.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Configure the mock to fail on generate
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Block each call until a unit arrives on `gate` (or it disconnects).
    pub fn with_gate(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Shared call counter, readable after the mock moves into a pipeline.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl AnimationGenerator for MockGenerator {
    fn generate(&self, audio: &[u8]) -> Result<Option<RawTensor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.recv().ok();
        }

        if self.should_fail {
            return Err(FacelinkError::Inference {
                message: "mock inference failure".to_string(),
            });
        }
        if audio.len() < self.min_bytes {
            return Ok(None);
        }

        let marker = audio.first().copied().unwrap_or(0) as f32;
        let mut row = vec![50.0; self.width];
        if let Some(first) = row.first_mut() {
            *first = marker;
        }
        let data: Vec<f32> = (0..self.frames).flat_map(|_| row.iter().copied()).collect();
        RawTensor::new(data, vec![self.frames, self.width]).map(Some)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
