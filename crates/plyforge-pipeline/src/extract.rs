//! Frame extraction stage: one ffmpeg invocation turns an uploaded video
//! into an ordered sequence of still frames.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use plyforge_tools::{ToolRequest, ToolRunner};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};

/// File extension of extracted frames, without the dot.
const FRAME_EXTENSION: &str = "png";

/// Output naming pattern handed to the extraction tool. The width is fixed
/// so that a lexicographic sort of the directory listing yields frames in
/// capture order.
const FRAME_NAME_PATTERN: &str = "%05d.png";

/// Configuration for the extraction stage.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Extraction tool name or path, resolved via the search path.
    pub ffmpeg: String,
    /// Fixed sampling rate in frames per second.
    pub fps: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            fps: 12,
        }
    }
}

/// Decomposes a video into still frames at a fixed sampling rate.
#[derive(Clone)]
pub struct FrameExtractor {
    runner: Arc<dyn ToolRunner>,
    config: ExtractorConfig,
}

impl FrameExtractor {
    /// Construct the stage over the given tool runner.
    #[must_use]
    pub fn new(runner: Arc<dyn ToolRunner>, config: ExtractorConfig) -> Self {
        Self { runner, config }
    }

    /// Extract frames from `video` into `frames_dir` and return them in
    /// capture order.
    ///
    /// An empty result is not an error at this layer; a degenerate video
    /// simply produces zero artifacts downstream.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Extraction`] when the tool is missing or
    /// exits nonzero (batch-fatal; no partial frame set is processed), and
    /// IO errors when the frames directory cannot be prepared or listed.
    pub async fn extract(&self, video: &Path, frames_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        fs::create_dir_all(frames_dir)
            .map_err(|source| PipelineError::io("extract.create_frames_dir", frames_dir, source))?;

        let request = ToolRequest::new(
            &self.config.ffmpeg,
            vec![
                OsString::from("-i"),
                video.as_os_str().to_owned(),
                OsString::from("-vf"),
                OsString::from(format!("fps={}", self.config.fps)),
                frames_dir.join(FRAME_NAME_PATTERN).into_os_string(),
            ],
        );

        self.runner
            .run(request)
            .await
            .map_err(|source| PipelineError::Extraction { source })?;

        let frames = list_frames(frames_dir)?;
        info!(
            video = %video.display(),
            frames = frames.len(),
            fps = self.config.fps,
            "extracted video frames"
        );
        Ok(frames)
    }
}

/// List extracted frames sorted lexicographically, which equals capture
/// order under the fixed-width naming pattern.
fn list_frames(frames_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    let entries = fs::read_dir(frames_dir)
        .map_err(|source| PipelineError::io("extract.read_frames_dir", frames_dir, source))?;

    let mut frames = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|source| PipelineError::io("extract.read_frame_entry", frames_dir, source))?;
        let path = entry.path();
        let is_frame = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(FRAME_EXTENSION));
        if is_frame {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}
