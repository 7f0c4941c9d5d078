//! External tool invocation for the reconstruction pipeline.
//!
//! Every external dependency (frame extraction, point-cloud reconstruction)
//! is an opaque command-line tool with exit-code success semantics. The
//! [`ToolRunner`] trait is the seam between pipeline stages and the real
//! processes, so stages can be exercised in tests with scripted runners.
#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

mod error;

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

pub use error::{ToolError, ToolResult};

/// One invocation of an external tool.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    /// Executable name (resolved via the search path) or explicit path.
    pub program: String,
    /// Arguments passed verbatim to the process.
    pub args: Vec<OsString>,
    /// Optional working directory for the process.
    pub current_dir: Option<PathBuf>,
}

impl ToolRequest {
    /// Build a request for `program` with the given arguments.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
            current_dir: None,
        }
    }

    /// Run the process from `dir` instead of the caller's working directory.
    #[must_use]
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

/// Captured output of a successfully completed invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Full standard output, lossily decoded.
    pub stdout: String,
    /// Full standard error, lossily decoded.
    pub stderr: String,
}

/// Seam between pipeline stages and external processes.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Resolve `program` to an executable path without starting a process.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] when the executable cannot be
    /// resolved on the search path.
    async fn resolve(&self, program: &str) -> ToolResult<PathBuf>;

    /// Run the tool to completion, capturing stdout and stderr fully.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] for an unresolvable executable,
    /// [`ToolError::Spawn`] when the process cannot be started, and
    /// [`ToolError::ExitStatus`] (carrying captured stderr) for a nonzero
    /// exit.
    async fn run(&self, request: ToolRequest) -> ToolResult<ToolOutput>;
}

/// Production [`ToolRunner`] backed by real subprocesses.
///
/// Resolution happens before the spawn attempt so that a missing binary is
/// reported as unavailability rather than as a spawn failure. Waiting on the
/// child goes through `tokio::process`, so one invocation never blocks the
/// scheduler for other batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Construct a runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn resolve(&self, program: &str) -> ToolResult<PathBuf> {
        which::which(program).map_err(|source| ToolError::NotFound {
            tool: program.to_string(),
            source,
        })
    }

    async fn run(&self, request: ToolRequest) -> ToolResult<ToolOutput> {
        let executable = self.resolve(&request.program).await?;

        let mut command = Command::new(&executable);
        command.args(&request.args);
        if let Some(dir) = &request.current_dir {
            command.current_dir(dir);
        }

        debug!(
            tool = %request.program,
            executable = %executable.display(),
            args = request.args.len(),
            "running external tool"
        );

        let output = command.output().await.map_err(|source| ToolError::Spawn {
            tool: request.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(ToolOutput { stdout, stderr })
        } else {
            Err(ToolError::ExitStatus {
                tool: request.program,
                code: output.status.code(),
                stderr,
            })
        }
    }
}
