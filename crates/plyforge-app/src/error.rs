//! # Design
//!
//! - Centralize application-level errors for bootstrap and serving.
//! - Keep error messages constant while carrying context fields for
//!   debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration values were invalid.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Optional value associated with the failure.
        value: Option<String>,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: plyforge_telemetry::TelemetryError,
    },
    /// Workspace management operations failed.
    #[error("workspace operation failed")]
    Workspace {
        /// Operation identifier.
        operation: &'static str,
        /// Source workspace error.
        source: plyforge_workspace::WorkspaceError,
    },
    /// API server operations failed.
    #[error("api server operation failed")]
    ApiServer {
        /// Operation identifier.
        operation: &'static str,
        /// Source API server error.
        source: plyforge_api::ApiServerError,
    },
}

impl AppError {
    pub(crate) const fn telemetry(
        operation: &'static str,
        source: plyforge_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn workspace(
        operation: &'static str,
        source: plyforge_workspace::WorkspaceError,
    ) -> Self {
        Self::Workspace { operation, source }
    }

    pub(crate) const fn api_server(
        operation: &'static str,
        source: plyforge_api::ApiServerError,
    ) -> Self {
        Self::ApiServer { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn app_error_helpers_build_variants() {
        let telemetry = AppError::telemetry(
            "telemetry.metrics",
            plyforge_telemetry::TelemetryError::MetricsEncode {
                source: prometheus::Error::AlreadyReg,
            },
        );
        assert!(matches!(telemetry, AppError::Telemetry { .. }));

        let workspace = AppError::workspace(
            "workspace.init",
            plyforge_workspace::WorkspaceError::BatchNotFound {
                batch_id: uuid::Uuid::nil(),
            },
        );
        assert!(matches!(workspace, AppError::Workspace { .. }));
        assert!(workspace.source().is_some());

        let api = AppError::api_server(
            "api_server.serve",
            plyforge_api::ApiServerError::Serve {
                source: io::Error::other("io"),
            },
        );
        assert!(matches!(api, AppError::ApiServer { .. }));
    }
}
