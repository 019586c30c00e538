//! Remote blendshape service backend.
//!
//! POSTs raw WAV bytes and expects `{"blendshapes": [[f32; 68], ...]}` back.
//! An empty list means the service judged the clip too short.
//!
//! Uses the blocking client: callers are pipeline worker threads or
//! `spawn_blocking` tasks, never the async runtime itself.

use super::{AnimationGenerator, RawTensor};
use crate::error::{FacelinkError, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct BlendshapeResponse {
    blendshapes: Vec<Vec<f32>>,
}

pub struct HttpGenerator {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpGenerator {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FacelinkError::Inference {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

/// Parse a service response body into a tensor, `None` when empty.
fn parse_response(body: &str) -> Result<Option<RawTensor>> {
    let parsed: BlendshapeResponse =
        serde_json::from_str(body).map_err(|e| FacelinkError::Inference {
            message: format!("Failed to parse blendshape response: {e}"),
        })?;
    if parsed.blendshapes.is_empty() {
        return Ok(None);
    }
    RawTensor::from_rows(parsed.blendshapes).map(Some)
}

impl AnimationGenerator for HttpGenerator {
    fn generate(&self, audio: &[u8]) -> Result<Option<RawTensor>> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .map_err(|e| FacelinkError::Inference {
                message: format!("Blendshape service request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(FacelinkError::Inference {
                message: format!("Blendshape service returned status {}", response.status()),
            });
        }

        let body = response.text().map_err(|e| FacelinkError::Inference {
            message: format!("Failed to read blendshape response: {e}"),
        })?;
        parse_response(&body)
    }

    fn name(&self) -> &str {
        "http"
    }
}
