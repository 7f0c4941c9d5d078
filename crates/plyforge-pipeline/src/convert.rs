//! Per-frame conversion stage: drives the reconstruction tool once per
//! frame (or once for a single image), tolerating individual frame failures
//! and streaming progress to an interested subscriber.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use plyforge_events::ProgressHub;
use plyforge_telemetry::Metrics;
use plyforge_tools::{ToolError, ToolRequest, ToolRunner};
use plyforge_workspace::ARTIFACT_EXTENSION;
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};

const OUTCOME_OK: &str = "ok";
const OUTCOME_FAILED: &str = "failed";
const OUTCOME_MISSING_OUTPUT: &str = "missing_output";

/// Terminal message pushed once every frame has been attempted.
const FINAL_PROGRESS_MESSAGE: &str = "Loading splat...";

/// Configuration for the conversion stage.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Reconstruction tool name or path, resolved via the search path.
    pub tool: String,
    /// Device argument forwarded to every invocation.
    pub device: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            tool: "sharp".to_string(),
            device: "cpu".to_string(),
        }
    }
}

/// Converts frames into point-cloud artifacts through the external
/// reconstruction tool.
#[derive(Clone)]
pub struct FrameConverter {
    runner: Arc<dyn ToolRunner>,
    hub: ProgressHub,
    metrics: Metrics,
    config: ConverterConfig,
}

impl FrameConverter {
    /// Construct the stage over the given tool runner, progress hub, and
    /// metrics handle.
    #[must_use]
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        hub: ProgressHub,
        metrics: Metrics,
        config: ConverterConfig,
    ) -> Self {
        Self {
            runner,
            hub,
            metrics,
            config,
        }
    }

    /// Convert every frame in capture order, returning the artifacts that
    /// were actually confirmed present on disk.
    ///
    /// A frame whose conversion exits nonzero, cannot be spawned, or leaves
    /// no artifact behind is logged and skipped; the batch is not failed by
    /// it, so callers must not assume one artifact per frame. When
    /// `client_id` is supplied, a `Converting to PLYs (i/n)` notification is
    /// pushed before each attempt and a terminal message after the last one;
    /// the counter reflects frames attempted, not frames succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ToolUnavailable`] when the reconstruction
    /// tool cannot be resolved (checked before any frame is attempted, and
    /// again should it disappear mid-batch), and IO errors when the output
    /// directory cannot be prepared.
    pub async fn convert_all(
        &self,
        frames: &[PathBuf],
        output_dir: &Path,
        client_id: Option<&str>,
    ) -> PipelineResult<Vec<PathBuf>> {
        self.runner
            .resolve(&self.config.tool)
            .await
            .map_err(|source| PipelineError::ToolUnavailable { source })?;

        fs::create_dir_all(output_dir)
            .map_err(|source| PipelineError::io("convert.create_output_dir", output_dir, source))?;

        let total = frames.len();
        let mut artifacts = Vec::new();

        for (index, frame) in frames.iter().enumerate() {
            if let Some(client_id) = client_id {
                self.notify(
                    client_id,
                    format!("Converting to PLYs ({}/{total})", index + 1),
                );
            }

            if let Some(artifact) = self.convert_frame(frame, output_dir).await? {
                artifacts.push(artifact);
            }
        }

        if let Some(client_id) = client_id {
            self.notify(client_id, FINAL_PROGRESS_MESSAGE);
        }

        info!(
            frames = total,
            artifacts = artifacts.len(),
            output_dir = %output_dir.display(),
            "finished per-frame conversion"
        );
        Ok(artifacts)
    }

    /// Convert a single image, the degenerate `n = 1` case used by direct
    /// image uploads. No progress fan-out is involved.
    ///
    /// # Errors
    ///
    /// Unlike the batch loop, every failure here is fatal:
    /// [`PipelineError::ToolUnavailable`] when the tool cannot be resolved,
    /// [`PipelineError::Conversion`] when the invocation fails, and
    /// [`PipelineError::OutputMissing`] when the tool exits cleanly without
    /// producing the artifact.
    pub async fn convert_one(&self, image: &Path, output_dir: &Path) -> PipelineResult<PathBuf> {
        let expected = self.expected_artifact(image, output_dir)?;
        match self.runner.run(self.build_request(image, output_dir)).await {
            Ok(_) => {}
            Err(source) if source.is_unavailable() => {
                return Err(PipelineError::ToolUnavailable { source });
            }
            Err(source) => return Err(PipelineError::Conversion { source }),
        }

        if expected.is_file() {
            self.metrics.inc_frame_converted(OUTCOME_OK);
            Ok(expected)
        } else {
            self.metrics.inc_frame_converted(OUTCOME_MISSING_OUTPUT);
            Err(PipelineError::OutputMissing { path: expected })
        }
    }

    /// Attempt one frame. `Ok(None)` is the skip-and-continue path; only
    /// tool unavailability escapes as an error.
    async fn convert_frame(
        &self,
        frame: &Path,
        output_dir: &Path,
    ) -> PipelineResult<Option<PathBuf>> {
        let expected = match self.expected_artifact(frame, output_dir) {
            Ok(expected) => expected,
            Err(err) => {
                warn!(frame = %frame.display(), error = %err, "skipping unusable frame");
                self.metrics.inc_frame_converted(OUTCOME_FAILED);
                return Ok(None);
            }
        };

        match self.runner.run(self.build_request(frame, output_dir)).await {
            Ok(_) => {}
            Err(source) if source.is_unavailable() => {
                return Err(PipelineError::ToolUnavailable { source });
            }
            Err(ToolError::ExitStatus { code, stderr, .. }) => {
                warn!(
                    frame = %frame.display(),
                    code = ?code,
                    stderr = %stderr,
                    "reconstruction failed for frame; skipping"
                );
                self.metrics.inc_frame_converted(OUTCOME_FAILED);
                return Ok(None);
            }
            Err(source) => {
                warn!(
                    frame = %frame.display(),
                    error = %source,
                    "reconstruction could not run for frame; skipping"
                );
                self.metrics.inc_frame_converted(OUTCOME_FAILED);
                return Ok(None);
            }
        }

        if expected.is_file() {
            self.metrics.inc_frame_converted(OUTCOME_OK);
            Ok(Some(expected))
        } else {
            warn!(
                frame = %frame.display(),
                expected = %expected.display(),
                "tool exited cleanly but artifact is absent; skipping"
            );
            self.metrics.inc_frame_converted(OUTCOME_MISSING_OUTPUT);
            Ok(None)
        }
    }

    fn build_request(&self, input: &Path, output_dir: &Path) -> ToolRequest {
        ToolRequest::new(
            &self.config.tool,
            vec![
                OsString::from("predict"),
                OsString::from("-i"),
                input.as_os_str().to_owned(),
                OsString::from("-o"),
                output_dir.as_os_str().to_owned(),
                OsString::from("--device"),
                OsString::from(&self.config.device),
            ],
        )
    }

    /// Artifact location derived deterministically from the source frame:
    /// same stem, artifact extension, inside the output directory.
    fn expected_artifact(&self, input: &Path, output_dir: &Path) -> PipelineResult<PathBuf> {
        let stem = input
            .file_stem()
            .ok_or_else(|| PipelineError::InvalidInput {
                field: "input",
                path: input.to_path_buf(),
            })?;
        let mut name = stem.to_os_string();
        name.push(".");
        name.push(ARTIFACT_EXTENSION);
        Ok(output_dir.join(name))
    }

    fn notify(&self, client_id: &str, message: impl Into<String>) {
        if !self.hub.try_notify(client_id, message) {
            self.metrics.inc_notification_unrouted();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use plyforge_events::progress_channel;
    use plyforge_tools::{ToolOutput, ToolResult};
    use tempfile::TempDir;

    /// Runner that mimics the reconstruction tool: writes `<stem>.ply` into
    /// the requested output directory, except for scripted failure stems.
    #[derive(Default)]
    struct ScriptedRunner {
        fail_stems: Vec<&'static str>,
        withhold_stems: Vec<&'static str>,
    }

    impl ScriptedRunner {
        fn parse_request(request: &ToolRequest) -> (PathBuf, PathBuf) {
            assert_eq!(request.args[0], OsString::from("predict"));
            assert_eq!(request.args[1], OsString::from("-i"));
            assert_eq!(request.args[3], OsString::from("-o"));
            assert_eq!(request.args[5], OsString::from("--device"));
            (
                PathBuf::from(&request.args[2]),
                PathBuf::from(&request.args[4]),
            )
        }
    }

    #[async_trait]
    impl ToolRunner for ScriptedRunner {
        async fn resolve(&self, program: &str) -> ToolResult<PathBuf> {
            Ok(PathBuf::from(program))
        }

        async fn run(&self, request: ToolRequest) -> ToolResult<ToolOutput> {
            let (input, output_dir) = Self::parse_request(&request);
            let stem = input
                .file_stem()
                .expect("frame stem")
                .to_string_lossy()
                .into_owned();

            if self.fail_stems.contains(&stem.as_str()) {
                return Err(ToolError::ExitStatus {
                    tool: request.program,
                    code: Some(1),
                    stderr: format!("no surface found in {stem}"),
                });
            }
            if !self.withhold_stems.contains(&stem.as_str()) {
                fs::write(output_dir.join(format!("{stem}.ply")), b"point-cloud")
                    .expect("write artifact");
            }
            Ok(ToolOutput {
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    struct MissingToolRunner;

    #[async_trait]
    impl ToolRunner for MissingToolRunner {
        async fn resolve(&self, program: &str) -> ToolResult<PathBuf> {
            Err(ToolError::NotFound {
                tool: program.to_string(),
                source: which::Error::CannotFindBinaryPath,
            })
        }

        async fn run(&self, request: ToolRequest) -> ToolResult<ToolOutput> {
            self.resolve(&request.program).await.map(|_| ToolOutput {
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn converter(runner: Arc<dyn ToolRunner>, hub: &ProgressHub) -> FrameConverter {
        FrameConverter::new(
            runner,
            hub.clone(),
            Metrics::new().expect("metrics"),
            ConverterConfig::default(),
        )
    }

    fn write_frames(dir: &Path, count: usize) -> Vec<PathBuf> {
        fs::create_dir_all(dir).expect("frames dir");
        (1..=count)
            .map(|index| {
                let path = dir.join(format!("{index:05}.png"));
                fs::write(&path, b"pixels").expect("write frame");
                path
            })
            .collect()
    }

    fn drain(receiver: &mut plyforge_events::ProgressReceiver) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[tokio::test]
    async fn one_failed_frame_does_not_fail_the_batch() -> PipelineResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let frames = write_frames(&temp.path().join("frames"), 5);
        let output_dir = temp.path().join("plys");

        let hub = ProgressHub::new();
        let (sender, mut receiver) = progress_channel();
        hub.register("viewer", sender);

        let converter = converter(
            Arc::new(ScriptedRunner {
                fail_stems: vec!["00003"],
                withhold_stems: Vec::new(),
            }),
            &hub,
        );

        let artifacts = converter
            .convert_all(&frames, &output_dir, Some("viewer"))
            .await?;

        assert_eq!(artifacts.len(), 4);
        assert!(!artifacts.contains(&output_dir.join("00003.ply")));
        for artifact in &artifacts {
            assert!(artifact.is_file());
        }

        let messages = drain(&mut receiver);
        assert_eq!(
            messages,
            vec![
                "Converting to PLYs (1/5)",
                "Converting to PLYs (2/5)",
                "Converting to PLYs (3/5)",
                "Converting to PLYs (4/5)",
                "Converting to PLYs (5/5)",
                FINAL_PROGRESS_MESSAGE,
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn clean_exit_without_artifact_is_skipped_like_a_failure() -> PipelineResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let frames = write_frames(&temp.path().join("frames"), 3);

        let hub = ProgressHub::new();
        let converter = converter(
            Arc::new(ScriptedRunner {
                fail_stems: Vec::new(),
                withhold_stems: vec!["00002"],
            }),
            &hub,
        );

        let artifacts = converter
            .convert_all(&frames, &temp.path().join("plys"), None)
            .await?;
        assert_eq!(artifacts.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn zero_frames_succeed_with_an_empty_artifact_list() -> PipelineResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let hub = ProgressHub::new();
        let (sender, mut receiver) = progress_channel();
        hub.register("viewer", sender);

        let converter = converter(Arc::new(ScriptedRunner::default()), &hub);
        let artifacts = converter
            .convert_all(&[], &temp.path().join("plys"), Some("viewer"))
            .await?;

        assert!(artifacts.is_empty());
        assert_eq!(drain(&mut receiver), vec![FINAL_PROGRESS_MESSAGE]);
        Ok(())
    }

    #[tokio::test]
    async fn unavailable_tool_aborts_before_any_frame() {
        let temp = TempDir::new().expect("tempdir");
        let frames = write_frames(&temp.path().join("frames"), 2);

        let hub = ProgressHub::new();
        let (sender, mut receiver) = progress_channel();
        hub.register("viewer", sender);

        let converter = converter(Arc::new(MissingToolRunner), &hub);
        let err = converter
            .convert_all(&frames, &temp.path().join("plys"), Some("viewer"))
            .await
            .expect_err("conversion should fail");

        assert!(matches!(err, PipelineError::ToolUnavailable { .. }));
        assert!(
            drain(&mut receiver).is_empty(),
            "no progress may be pushed before the availability check"
        );
    }

    #[tokio::test]
    async fn progress_is_dropped_silently_without_a_subscriber() -> PipelineResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let frames = write_frames(&temp.path().join("frames"), 2);

        let hub = ProgressHub::new();
        let converter = converter(Arc::new(ScriptedRunner::default()), &hub);
        let artifacts = converter
            .convert_all(&frames, &temp.path().join("plys"), Some("ghost"))
            .await?;
        assert_eq!(artifacts.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn convert_one_returns_the_artifact_path() -> PipelineResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let image = temp.path().join("portrait.png");
        fs::write(&image, b"pixels").expect("write image");

        let hub = ProgressHub::new();
        let converter = converter(Arc::new(ScriptedRunner::default()), &hub);
        let artifact = converter.convert_one(&image, temp.path()).await?;

        assert_eq!(artifact, temp.path().join("portrait.ply"));
        assert!(artifact.is_file());
        Ok(())
    }

    #[tokio::test]
    async fn convert_one_reports_a_missing_artifact_as_an_error() {
        let temp = TempDir::new().expect("tempdir");
        let image = temp.path().join("portrait.png");
        fs::write(&image, b"pixels").expect("write image");

        let hub = ProgressHub::new();
        let converter = converter(
            Arc::new(ScriptedRunner {
                fail_stems: Vec::new(),
                withhold_stems: vec!["portrait"],
            }),
            &hub,
        );

        let err = converter
            .convert_one(&image, temp.path())
            .await
            .expect_err("conversion should fail");
        assert!(matches!(err, PipelineError::OutputMissing { .. }));
    }
}
