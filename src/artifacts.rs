//! Per-request artifacts on disk.
//!
//! Layout under the store root:
//!
//! ```text
//! <uuid>/audio.wav
//! <uuid>/shapes.csv
//! <uuid>/old/shapes_<uuid>.csv   (previous versions, after regeneration)
//! ```

use crate::defaults::OUTPUT_DIM;
use crate::error::{FacelinkError, Result};
use crate::frame::{CHANNEL_NAMES, Frame, FrameSequence};
use crate::inference::AnimationGenerator;
use crate::pipeline::PostProcessor;
use std::fs;
use std::path::{Path, PathBuf};

pub const AUDIO_FILE: &str = "audio.wav";
pub const SHAPES_FILE: &str = "shapes.csv";
const OLD_DIR: &str = "old";

/// Location of one saved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub id: String,
    pub dir: PathBuf,
}

/// Outcome of a regeneration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegenSummary {
    pub regenerated: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `audio.wav` and `shapes.csv` into a fresh directory.
    pub fn save(&self, audio: &[u8], frames: &FrameSequence) -> Result<SavedArtifact> {
        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.root.join(&id);
        fs::create_dir_all(&dir).map_err(|e| artifact_err(&dir, e))?;

        let audio_path = dir.join(AUDIO_FILE);
        fs::write(&audio_path, audio).map_err(|e| artifact_err(&audio_path, e))?;
        write_shapes(&dir.join(SHAPES_FILE), frames)?;

        tracing::debug!(id = %id, frames = frames.len(), "saved artifacts");
        Ok(SavedArtifact { id, dir })
    }

    /// Request directories that contain an `audio.wav`.
    pub fn entries(&self) -> Result<Vec<PathBuf>> {
        let read = fs::read_dir(&self.root).map_err(|e| artifact_err(&self.root, e))?;
        let mut dirs: Vec<PathBuf> = read
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir() && path.join(AUDIO_FILE).is_file())
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    /// Rebuild `shapes.csv` for every stored request.
    ///
    /// The previous file moves to `old/shapes_<uuid>.csv`. Clips the
    /// generator reports as insufficient are skipped and left untouched.
    pub fn regenerate(
        &self,
        generator: &dyn AnimationGenerator,
        post_processor: &PostProcessor,
    ) -> Result<RegenSummary> {
        let mut summary = RegenSummary::default();

        for dir in self.entries()? {
            match regenerate_one(&dir, generator, post_processor) {
                Ok(true) => {
                    tracing::info!(dir = %dir.display(), "regenerated shapes");
                    summary.regenerated += 1;
                }
                Ok(false) => {
                    tracing::info!(dir = %dir.display(), "audio too short, skipped");
                    summary.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), "regeneration failed: {}", e);
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}

fn regenerate_one(
    dir: &Path,
    generator: &dyn AnimationGenerator,
    post_processor: &PostProcessor,
) -> Result<bool> {
    let audio_path = dir.join(AUDIO_FILE);
    let audio = fs::read(&audio_path).map_err(|e| artifact_err(&audio_path, e))?;

    let Some(raw) = generator.generate(&audio)? else {
        return Ok(false);
    };
    let frames = post_processor.process(raw)?;

    let shapes_path = dir.join(SHAPES_FILE);
    if shapes_path.exists() {
        let old_dir = dir.join(OLD_DIR);
        fs::create_dir_all(&old_dir).map_err(|e| artifact_err(&old_dir, e))?;
        let target = old_dir.join(format!("shapes_{}.csv", uuid::Uuid::new_v4()));
        fs::rename(&shapes_path, &target).map_err(|e| artifact_err(&shapes_path, e))?;
    }
    write_shapes(&shapes_path, &frames)?;
    Ok(true)
}

/// Serialize frames as CSV: frame index, channel count, then 68 channels.
pub fn shapes_csv(frames: &FrameSequence) -> String {
    let mut out = String::from("Timecode,BlendshapeCount");
    for name in CHANNEL_NAMES {
        out.push(',');
        out.push_str(name);
    }
    out.push('\n');

    for (i, frame) in frames.frames().iter().enumerate() {
        out.push_str(&format!("{},{}", i, OUTPUT_DIM));
        for value in frame {
            out.push_str(&format!(",{}", value));
        }
        out.push('\n');
    }
    out
}

fn write_shapes(path: &Path, frames: &FrameSequence) -> Result<()> {
    fs::write(path, shapes_csv(frames)).map_err(|e| artifact_err(path, e))
}

/// Parse a `shapes.csv` file written by [`shapes_csv`] or compatible tools.
pub fn load_shapes(path: &Path) -> Result<FrameSequence> {
    let text = fs::read_to_string(path).map_err(|e| artifact_err(path, e))?;
    parse_shapes(&text).map_err(|message| FacelinkError::Artifact {
        message: format!("{}: {}", path.display(), message),
    })
}

fn parse_shapes(text: &str) -> std::result::Result<FrameSequence, String> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or("empty file")?;
    let columns = header.split(',').count();
    if columns != OUTPUT_DIM + 2 {
        return Err(format!(
            "expected {} columns, header has {}",
            OUTPUT_DIM + 2,
            columns
        ));
    }

    let mut frames = Vec::new();
    for (row, line) in lines.enumerate() {
        let values: Vec<&str> = line.split(',').collect();
        if values.len() != OUTPUT_DIM + 2 {
            return Err(format!("row {} has {} columns", row + 1, values.len()));
        }
        let mut frame: Frame = [0.0; OUTPUT_DIM];
        for (slot, raw) in frame.iter_mut().zip(&values[2..]) {
            *slot = raw
                .trim()
                .parse()
                .map_err(|_| format!("row {}: invalid number {:?}", row + 1, raw))?;
        }
        frames.push(frame);
    }
    Ok(FrameSequence::new(frames))
}

fn artifact_err(path: &Path, e: std::io::Error) -> FacelinkError {
    FacelinkError::Artifact {
        message: format!("{}: {}", path.display(), e),
    }
}
