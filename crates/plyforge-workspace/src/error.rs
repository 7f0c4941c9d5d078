//! # Design
//!
//! - Provide structured, constant-message errors for workspace management.
//! - Capture operation context (paths, batch ids) to make failures
//!   reproducible in tests.
//! - Preserve source errors without interpolating context into error
//!   messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Result type for workspace operations.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// Errors produced by batch workspace management.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// IO failures while interacting with the filesystem.
    #[error("workspace io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The requested batch workspace does not exist.
    #[error("batch not found")]
    BatchNotFound {
        /// Identifier of the missing batch.
        batch_id: Uuid,
    },
}

impl WorkspaceError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
