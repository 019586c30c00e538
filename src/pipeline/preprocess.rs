//! Preprocessing station: audio in, animation frames out.

use crate::artifacts::ArtifactStore;
use crate::error::Result;
use crate::frame::FrameSequence;
use crate::inference::AnimationGenerator;
use crate::pipeline::error::StationError;
use crate::pipeline::post_processor::PostProcessor;
use crate::pipeline::station::Station;
use crate::pipeline::types::{AudioRequest, Counters, PreparedClip};
use std::sync::Arc;

/// Run the generator and post-processor over one clip.
///
/// `Ok(None)` means the clip is too short to animate.
pub fn generate_frames(
    generator: &dyn AnimationGenerator,
    post: &PostProcessor,
    audio: &[u8],
) -> Result<Option<FrameSequence>> {
    let Some(raw) = generator.generate(audio)? else {
        return Ok(None);
    };
    let frames = post.process(raw)?;
    if frames.is_empty() {
        return Ok(None);
    }
    Ok(Some(frames))
}

pub struct PreprocessStation {
    generator: Arc<dyn AnimationGenerator>,
    post: PostProcessor,
    artifacts: Option<ArtifactStore>,
    counters: Arc<Counters>,
}

impl PreprocessStation {
    pub fn new(
        generator: Arc<dyn AnimationGenerator>,
        post: PostProcessor,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            generator,
            post,
            artifacts: None,
            counters,
        }
    }

    /// Persist every prepared clip under `store`.
    pub fn with_artifacts(mut self, store: ArtifactStore) -> Self {
        self.artifacts = Some(store);
        self
    }
}

impl Station for PreprocessStation {
    type Input = AudioRequest;
    type Output = PreparedClip;

    fn process(
        &mut self,
        request: AudioRequest,
    ) -> std::result::Result<Option<PreparedClip>, StationError> {
        let frames = match generate_frames(self.generator.as_ref(), &self.post, &request.audio) {
            Ok(Some(frames)) => frames,
            Ok(None) => {
                Counters::bump(&self.counters.dropped);
                tracing::info!(
                    id = request.id,
                    bytes = request.audio.len(),
                    "insufficient audio for animation, request dropped"
                );
                return Ok(None);
            }
            // Configured width was checked by `PostProcessor::new`; this is one bad reply
            Err(e) => {
                Counters::bump(&self.counters.failed);
                return Err(StationError::Recoverable(format!(
                    "request {}: {}",
                    request.id, e
                )));
            }
        };

        if let Some(store) = &self.artifacts
            && let Err(e) = store.save(&request.audio, &frames)
        {
            tracing::warn!(id = request.id, "failed to save artifacts: {}", e);
        }

        tracing::debug!(
            id = request.id,
            frames = frames.len(),
            generator = self.generator.name(),
            "clip prepared"
        );
        Ok(Some(PreparedClip { request, frames }))
    }

    fn name(&self) -> &'static str {
        "preprocess"
    }

    fn shutdown(&mut self) {
        tracing::debug!("preprocess station stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{AUDIO_FILE, SHAPES_FILE};
    use crate::inference::mock::MockGenerator;
    use std::sync::atomic::Ordering;

    fn station(generator: MockGenerator) -> (PreprocessStation, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let post = PostProcessor::new(68, true).unwrap();
        (
            PreprocessStation::new(Arc::new(generator), post, counters.clone()),
            counters,
        )
    }

    #[test]
    fn prepares_rescaled_frames() {
        let (mut station, counters) = station(MockGenerator::new(40));
        let clip = station
            .process(AudioRequest::new(1, vec![20u8, 0, 0]))
            .unwrap()
            .unwrap();

        assert_eq!(clip.request.id, 1);
        assert_eq!(clip.frames.len(), 40);
        assert!((clip.frames.frames()[0][0] - 0.2).abs() < 1e-6);
        assert!((clip.frames.frames()[0][1] - 0.5).abs() < 1e-6);
        assert_eq!(counters.snapshot().failed, 0);
    }

    #[test]
    fn insufficient_audio_is_dropped_and_counted() {
        let (mut station, counters) = station(MockGenerator::new(40).with_min_bytes(10));
        let out = station.process(AudioRequest::new(1, vec![1u8, 2])).unwrap();
        assert!(out.is_none());
        assert_eq!(counters.dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn inference_failure_is_recoverable() {
        let (mut station, counters) = station(MockGenerator::new(40).with_failure());
        let err = station.process(AudioRequest::new(3, vec![1u8])).unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("request 3"));
        assert_eq!(counters.failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn wrong_width_from_backend_is_recoverable() {
        let (mut station, counters) = station(MockGenerator::new(40).with_width(61));
        let err = station.process(AudioRequest::new(4, vec![1u8])).unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("request 4"));
        assert_eq!(counters.failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn saves_artifacts_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let (station, _) = station(MockGenerator::new(30));
        let mut station = station.with_artifacts(ArtifactStore::new(dir.path()));

        station
            .process(AudioRequest::new(1, vec![9u8, 9, 9]))
            .unwrap()
            .unwrap();

        let entries = ArtifactStore::new(dir.path()).entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].join(AUDIO_FILE).is_file());
        assert!(entries[0].join(SHAPES_FILE).is_file());
    }

    #[test]
    fn artifact_failure_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let (station, _) = station(MockGenerator::new(30));
        // A regular file where the root directory should be
        let mut station = station.with_artifacts(ArtifactStore::new(&blocker));
        let out = station.process(AudioRequest::new(1, vec![1u8])).unwrap();
        assert!(out.is_some());
    }

    #[test]
    fn generate_frames_shapes_only() {
        let post = PostProcessor::new(68, false).unwrap();
        let frames = generate_frames(&MockGenerator::new(12), &post, &[100u8])
            .unwrap()
            .unwrap();
        assert_eq!(frames.len(), 12);
        assert!((frames.frames()[11][0] - 1.0).abs() < 1e-6);

        let none = generate_frames(&MockGenerator::new(0), &post, &[1u8]).unwrap();
        assert!(none.is_none());
    }
}
