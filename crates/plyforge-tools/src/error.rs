//! # Design
//!
//! - Provide structured, constant-message errors for external tool
//!   invocation.
//! - Capture the tool name, exit code, and full stderr so callers can decide
//!   whether a failure is fatal to the request or only to one unit of work.
//! - Preserve source errors without interpolating context into error
//!   messages.

use std::io;

use thiserror::Error;

/// Result type for external tool invocation.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors produced when resolving or running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The executable could not be resolved on the search path.
    #[error("tool not found on search path")]
    NotFound {
        /// Name of the unresolvable executable.
        tool: String,
        /// Underlying resolution error.
        source: which::Error,
    },
    /// The process could not be spawned or awaited.
    #[error("tool spawn failure")]
    Spawn {
        /// Name of the executable being started.
        tool: String,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The process ran but exited with a nonzero status.
    #[error("tool exited with nonzero status")]
    ExitStatus {
        /// Name of the executable that failed.
        tool: String,
        /// Exit code, when the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard error output.
        stderr: String,
    },
}

impl ToolError {
    /// Whether the failure means the tool is unavailable rather than that a
    /// single invocation failed.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
