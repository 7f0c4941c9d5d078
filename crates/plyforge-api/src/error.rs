//! Response error wrapper and server-level errors.
//!
//! Fatal conditions are reported back to the caller as a structured
//! `{ "error": ... }` payload with an appropriate status code; none of them
//! crashes the serving process.

use std::io;
use std::net::SocketAddr;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use plyforge_archive::ArchiveError;
use plyforge_pipeline::PipelineError;
use plyforge_tools::ToolError;
use plyforge_workspace::WorkspaceError;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while hosting the API listener.
#[derive(Debug, Error)]
pub enum ApiServerError {
    /// The listener socket could not be bound.
    #[error("failed to bind api listener")]
    Bind {
        /// Address the listener attempted to bind.
        addr: SocketAddr,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The server loop terminated with an error.
    #[error("api server terminated")]
    Serve {
        /// Underlying IO error.
        source: io::Error,
    },
}

/// Structured API error rendered as `{ "error": ... }` JSON.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    detail: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }

    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub(crate) fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }

    #[cfg(test)]
    pub(crate) const fn status(&self) -> StatusCode {
        self.status
    }

    #[cfg(test)]
    pub(crate) fn detail(&self) -> &str {
        &self.detail
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody { error: self.detail }),
        )
            .into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::ToolUnavailable {
                source: ToolError::NotFound { tool, .. },
            } => Self::internal(format!("{tool} executable not found in PATH")),
            PipelineError::Extraction {
                source: ToolError::NotFound { tool, .. },
            } => Self::internal(format!("{tool} not found. Please install {tool}.")),
            PipelineError::Extraction {
                source: ToolError::ExitStatus { stderr, .. },
            } => Self::internal(format!("frame extraction failed: {stderr}")),
            PipelineError::Conversion {
                source: ToolError::ExitStatus { stderr, .. },
            } => Self::internal(format!("prediction failed: {stderr}")),
            PipelineError::OutputMissing { .. } => {
                Self::internal("output file was not generated")
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<WorkspaceError> for ApiError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::BatchNotFound { .. } => Self::not_found("batch not found"),
            WorkspaceError::Io { .. } => Self::internal("workspace unavailable"),
        }
    }
}

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::BatchNotFound { .. } => Self::not_found("batch not found"),
            _ => Self::internal("failed to create zip"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_map_to_actionable_details() {
        let missing_tool = ApiError::from(PipelineError::ToolUnavailable {
            source: ToolError::NotFound {
                tool: "sharp".to_string(),
                source: which::Error::CannotFindBinaryPath,
            },
        });
        assert_eq!(missing_tool.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(missing_tool.detail().contains("sharp"));

        let extraction = ApiError::from(PipelineError::Extraction {
            source: ToolError::ExitStatus {
                tool: "ffmpeg".to_string(),
                code: Some(1),
                stderr: "moov atom not found".to_string(),
            },
        });
        assert!(extraction.detail().contains("moov atom not found"));
    }

    #[test]
    fn unknown_batches_become_not_found_responses() {
        let err = ApiError::from(WorkspaceError::BatchNotFound {
            batch_id: uuid::Uuid::nil(),
        });
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = ApiError::from(ArchiveError::BatchNotFound {
            batch_id: uuid::Uuid::nil(),
        });
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
