//! # Design
//!
//! - Provide structured, constant-message errors for artifact packaging.
//! - Capture operation context (paths, batch ids) to make failures
//!   reproducible in tests.
//! - Preserve source errors without interpolating context into error
//!   messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Result type for packaging operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors produced while assembling a batch's downloadable archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The batch workspace does not exist.
    #[error("batch not found")]
    BatchNotFound {
        /// Identifier of the missing batch.
        batch_id: Uuid,
    },
    /// IO failures while collecting or writing archive content.
    #[error("archive io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Traversal failures while scanning the outputs directory.
    #[error("archive walkdir failure")]
    Walkdir {
        /// Operation that triggered the traversal failure.
        operation: &'static str,
        /// Path involved in the traversal failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// Zip encoding failures.
    #[error("archive zip failure")]
    Zip {
        /// Operation that triggered the archive failure.
        operation: &'static str,
        /// Path involved in the archive failure.
        path: PathBuf,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
}

impl ArchiveError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn zip(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: zip::result::ZipError,
    ) -> Self {
        Self::Zip {
            operation,
            path: path.into(),
            source,
        }
    }
}
