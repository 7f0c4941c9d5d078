//! Upload, download, and observability endpoints.

use std::path::{Path as StdPath, PathBuf};
use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use plyforge_telemetry::{Metrics, build_sha};
use serde::Serialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::{ApiState, artifact_url, video_artifact_url};

/// Message pushed before frame extraction begins.
const VIDEO_RECEIVED_MESSAGE: &str = "Processing video...";

/// Download filename presented to the browser for batch archives.
const ARCHIVE_DOWNLOAD_NAME: &str = "ply_files.zip";

#[derive(Serialize)]
pub(crate) struct PredictResponse {
    ply_url: String,
    batch_id: Uuid,
}

#[derive(Serialize)]
pub(crate) struct UploadVideoResponse {
    ply_urls: Vec<String>,
    batch_id: Uuid,
}

/// Decrements the active-batch gauge when a request handler returns,
/// successfully or not.
struct ActiveBatch {
    metrics: Metrics,
}

impl ActiveBatch {
    fn enter(metrics: &Metrics, kind: &str) -> Self {
        metrics.inc_batch_started(kind);
        metrics.inc_active_batches();
        Self {
            metrics: metrics.clone(),
        }
    }
}

impl Drop for ActiveBatch {
    fn drop(&mut self) {
        self.metrics.dec_active_batches();
    }
}

/// `POST /predict`: single-image reconstruction.
pub(crate) async fn predict(
    State(state): State<Arc<ApiState>>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let batch = state.workspaces.create_batch()?;
    let _active = ActiveBatch::enter(&state.metrics, "image");

    let upload = receive_upload(multipart, batch.dir()).await?;
    let artifact = state
        .converter
        .convert_one(&upload.input_path, batch.dir())
        .await?;

    let file_name = bare_name(&artifact);
    info!(batch_id = %batch.id(), artifact = %file_name, "single image reconstructed");
    Ok(Json(PredictResponse {
        ply_url: artifact_url(batch.id(), &file_name),
        batch_id: batch.id(),
    }))
}

/// `POST /upload_video`: frame extraction followed by per-frame
/// conversion, with progress pushed to the optional `client_id` subscriber.
pub(crate) async fn upload_video(
    State(state): State<Arc<ApiState>>,
    multipart: Multipart,
) -> Result<Json<UploadVideoResponse>, ApiError> {
    let batch = state.workspaces.create_batch()?;
    let _active = ActiveBatch::enter(&state.metrics, "video");

    let upload = receive_upload(multipart, batch.dir()).await?;
    let client_id = upload.client_id.as_deref();

    if let Some(client_id) = client_id
        && !state.hub.try_notify(client_id, VIDEO_RECEIVED_MESSAGE)
    {
        state.metrics.inc_notification_unrouted();
    }

    let frames = state
        .extractor
        .extract(&upload.input_path, &batch.frames_dir())
        .await?;
    state
        .metrics
        .add_frames_extracted(u64::try_from(frames.len()).unwrap_or(u64::MAX));

    let artifacts = state
        .converter
        .convert_all(&frames, &batch.outputs_dir(), client_id)
        .await?;

    let ply_urls = artifacts
        .iter()
        .map(|artifact| video_artifact_url(batch.id(), &bare_name(artifact)))
        .collect();

    info!(
        batch_id = %batch.id(),
        frames = frames.len(),
        artifacts = artifacts.len(),
        "video batch processed"
    );
    Ok(Json(UploadVideoResponse {
        ply_urls,
        batch_id: batch.id(),
    }))
}

/// `GET /download_zip/{batch_id}`: package and return the batch archive.
pub(crate) async fn download_zip(
    State(state): State<Arc<ApiState>>,
    Path(batch_id): Path<String>,
) -> Result<Response, ApiError> {
    let batch_id = Uuid::parse_str(&batch_id)
        .map_err(|_| ApiError::not_found("batch not found"))?;
    let workspace = state.workspaces.resolve_batch(batch_id)?;

    let archive_path = plyforge_archive::package_batch(&workspace, batch_id).map_err(|err| {
        error!(batch_id = %batch_id, error = %err, "failed to package batch");
        ApiError::from(err)
    })?;
    state.metrics.inc_archive_built();

    let bytes = tokio::fs::read(&archive_path)
        .await
        .map_err(|err| {
            error!(archive = %archive_path.display(), error = %err, "failed to read archive");
            ApiError::internal("failed to create zip")
        })?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{ARCHIVE_DOWNLOAD_NAME}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// `GET /healthz`: liveness probe.
pub(crate) async fn healthz() -> Response {
    Json(json!({ "status": "ok", "build_sha": build_sha() })).into_response()
}

/// `GET /metrics`: Prometheus text exposition.
pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let rendered = state
        .metrics
        .render()
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        rendered,
    )
        .into_response())
}

struct UploadPayload {
    input_path: PathBuf,
    client_id: Option<String>,
}

/// Stream the multipart upload into the batch workspace.
///
/// The `file` field is written to disk chunk by chunk; an optional
/// `client_id` text field addresses progress notifications.
async fn receive_upload(
    mut multipart: Multipart,
    dest_dir: &StdPath,
) -> Result<UploadPayload, ApiError> {
    let mut input_path = None;
    let mut client_id = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("malformed multipart upload: {err}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let file_name = sanitize_file_name(field.file_name())?;
                let path = dest_dir.join(&file_name);
                let mut file = tokio::fs::File::create(&path).await.map_err(|err| {
                    error!(path = %path.display(), error = %err, "failed to create upload file");
                    ApiError::internal("failed to store upload")
                })?;
                while let Some(chunk) = field.chunk().await.map_err(|err| {
                    ApiError::bad_request(format!("upload stream interrupted: {err}"))
                })? {
                    file.write_all(&chunk).await.map_err(|err| {
                        error!(path = %path.display(), error = %err, "failed to write upload chunk");
                        ApiError::internal("failed to store upload")
                    })?;
                }
                input_path = Some(path);
            }
            Some("client_id") => {
                let value = field.text().await.map_err(|err| {
                    ApiError::bad_request(format!("unreadable client_id field: {err}"))
                })?;
                if !value.trim().is_empty() {
                    client_id = Some(value);
                }
            }
            _ => {}
        }
    }

    input_path
        .map(|input_path| UploadPayload {
            input_path,
            client_id,
        })
        .ok_or_else(|| ApiError::bad_request("multipart upload is missing a 'file' field"))
}

/// Bare filename of a path, for archive-safe public URLs.
fn bare_name(path: &StdPath) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Strip any client-supplied directory components from an upload filename.
fn sanitize_file_name(raw: Option<&str>) -> Result<String, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::bad_request("upload is missing a filename"))?;
    StdPath::new(raw)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("invalid upload filename"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_file_name_strips_directories() {
        assert_eq!(
            sanitize_file_name(Some("clip.mp4")).expect("plain name"),
            "clip.mp4"
        );
        assert_eq!(
            sanitize_file_name(Some("../../etc/passwd")).expect("nested name"),
            "passwd"
        );
        assert!(sanitize_file_name(Some("")).is_err());
        assert!(sanitize_file_name(Some("..")).is_err());
        assert!(sanitize_file_name(None).is_err());
    }

    #[test]
    fn bare_name_uses_the_final_component() {
        assert_eq!(bare_name(StdPath::new("plys/00001.ply")), "00001.ply");
        assert_eq!(bare_name(StdPath::new("portrait.ply")), "portrait.ply");
    }

    #[test]
    fn batch_helpers_are_linked_into_urls() {
        let batch_id = Uuid::nil();
        assert!(artifact_url(batch_id, "a.ply").ends_with("/a.ply"));
    }
}
