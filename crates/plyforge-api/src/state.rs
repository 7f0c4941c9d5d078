//! Shared application state and artifact URL helpers.

use plyforge_events::ProgressHub;
use plyforge_pipeline::{FrameConverter, FrameExtractor};
use plyforge_telemetry::Metrics;
use plyforge_workspace::{OUTPUTS_DIR_NAME, WorkspaceManager};
use uuid::Uuid;

use crate::ARTIFACTS_MOUNT;

/// Dependencies shared by every request handler.
pub(crate) struct ApiState {
    pub(crate) workspaces: WorkspaceManager,
    pub(crate) hub: ProgressHub,
    pub(crate) extractor: FrameExtractor,
    pub(crate) converter: FrameConverter,
    pub(crate) metrics: Metrics,
}

impl ApiState {
    pub(crate) const fn new(
        workspaces: WorkspaceManager,
        hub: ProgressHub,
        extractor: FrameExtractor,
        converter: FrameConverter,
        metrics: Metrics,
    ) -> Self {
        Self {
            workspaces,
            hub,
            extractor,
            converter,
            metrics,
        }
    }
}

/// Public URL of an artifact stored directly in the batch workspace root.
pub(crate) fn artifact_url(batch_id: Uuid, file_name: &str) -> String {
    format!("{ARTIFACTS_MOUNT}/{batch_id}/{file_name}")
}

/// Public URL of an artifact stored in the batch's frame-outputs
/// subdirectory.
pub(crate) fn video_artifact_url(batch_id: Uuid, file_name: &str) -> String {
    format!("{ARTIFACTS_MOUNT}/{batch_id}/{OUTPUTS_DIR_NAME}/{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_the_public_mount_layout() {
        let batch_id = Uuid::nil();
        assert_eq!(
            artifact_url(batch_id, "portrait.ply"),
            format!("/artifacts/{batch_id}/portrait.ply")
        );
        assert_eq!(
            video_artifact_url(batch_id, "00001.ply"),
            format!("/artifacts/{batch_id}/plys/00001.ply")
        );
    }
}
