//! # Design
//!
//! - Centralize pipeline-stage errors for extraction and conversion.
//! - Keep error messages constant while carrying context fields for
//!   debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use plyforge_tools::ToolError;
use thiserror::Error;

/// Result type for pipeline stages.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors produced by the extraction and conversion stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Frame extraction failed; this is always batch-fatal.
    #[error("frame extraction failed")]
    Extraction {
        /// Underlying tool failure.
        source: ToolError,
    },
    /// The reconstruction tool could not be resolved; batch-fatal before any
    /// frame is attempted.
    #[error("reconstruction tool unavailable")]
    ToolUnavailable {
        /// Underlying resolution failure.
        source: ToolError,
    },
    /// A single-image reconstruction failed.
    #[error("reconstruction failed")]
    Conversion {
        /// Underlying tool failure.
        source: ToolError,
    },
    /// The tool exited successfully but the expected artifact is absent.
    #[error("expected artifact missing")]
    OutputMissing {
        /// Path where the artifact was expected.
        path: PathBuf,
    },
    /// An input path could not be interpreted.
    #[error("invalid pipeline input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Offending path.
        path: PathBuf,
    },
    /// IO failures while preparing or inspecting stage directories.
    #[error("pipeline io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
