//! Router construction and server host for the API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, MatchedPath, Request, State},
    http::{Method, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use plyforge_events::ProgressHub;
use plyforge_pipeline::{FrameConverter, FrameExtractor};
use plyforge_telemetry::{Metrics, build_sha};
use plyforge_workspace::WorkspaceManager;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::info;

use crate::ARTIFACTS_MOUNT;
use crate::error::ApiServerError;
use crate::handlers::{download_zip, healthz, metrics, predict, upload_video};
use crate::state::ApiState;
use crate::ws::subscribe;

/// Uploads larger than this are rejected before reaching a handler.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Axum router wrapper that hosts the Plyforge API services.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Construct a new API server with shared dependencies wired through
    /// application state.
    ///
    /// `static_dir`, when present, is served as a single-page application
    /// fallback for every route the API does not claim.
    #[must_use]
    pub fn new(
        workspaces: WorkspaceManager,
        hub: ProgressHub,
        extractor: FrameExtractor,
        converter: FrameConverter,
        telemetry: Metrics,
        static_dir: Option<PathBuf>,
    ) -> Self {
        let workspace_root = workspaces.root().to_path_buf();
        let state = Arc::new(ApiState::new(
            workspaces, hub, extractor, converter, telemetry,
        ));

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE]);

        let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                route = %request.uri().path(),
                build_sha = %build_sha(),
            )
        });

        let mut router = Router::new()
            .route("/predict", post(predict))
            .route("/upload_video", post(upload_video))
            .route("/download_zip/{batch_id}", get(download_zip))
            .route("/ws/{client_id}", get(subscribe))
            .route("/healthz", get(healthz))
            .route("/metrics", get(metrics))
            .nest_service(ARTIFACTS_MOUNT, ServeDir::new(workspace_root))
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                track_requests,
            ))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .layer(cors_layer)
            .layer(trace_layer)
            .with_state(state);

        if let Some(static_dir) = static_dir {
            let index = static_dir.join("index.html");
            router = router.fallback_service(ServeDir::new(&static_dir).fallback(ServeFile::new(index)));
        }

        Self { router }
    }

    /// Bind `addr` and serve requests until the listener fails or the task
    /// is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server loop
    /// terminates abnormally.
    pub async fn serve(self, addr: SocketAddr) -> Result<(), ApiServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        info!(addr = %addr, "api listener bound");
        axum::serve(listener, self.router.into_make_service())
            .await
            .map_err(|source| ApiServerError::Serve { source })
    }

    #[cfg(test)]
    pub(crate) fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Record one counter sample per finished request, labelled by matched
/// route when available.
async fn track_requests(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    let route = request.extensions().get::<MatchedPath>().map_or_else(
        || request.uri().path().to_string(),
        |matched| matched.as_str().to_string(),
    );
    let response = next.run(request).await;
    state
        .metrics
        .inc_http_request(&route, response.status().as_u16());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use plyforge_pipeline::{ConverterConfig, ExtractorConfig};
    use plyforge_tools::{ProcessRunner, ToolRunner};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_server(temp: &TempDir) -> (ApiServer, WorkspaceManager) {
        let workspaces =
            WorkspaceManager::init(temp.path().join("batches")).expect("workspace init");
        let hub = ProgressHub::new();
        let telemetry = Metrics::new().expect("metrics");
        let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner::new());
        let extractor = FrameExtractor::new(Arc::clone(&runner), ExtractorConfig::default());
        let converter = FrameConverter::new(
            runner,
            hub.clone(),
            telemetry.clone(),
            ConverterConfig::default(),
        );
        let server = ApiServer::new(
            workspaces.clone(),
            hub,
            extractor,
            converter,
            telemetry,
            None,
        );
        (server, workspaces)
    }

    async fn send(server: &ApiServer, uri: &str) -> StatusCode {
        let response = server
            .router()
            .oneshot(
                HttpRequest::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        response.status()
    }

    #[tokio::test]
    async fn healthz_and_metrics_respond() {
        let temp = TempDir::new().expect("tempdir");
        let (server, _workspaces) = test_server(&temp);
        assert_eq!(send(&server, "/healthz").await, StatusCode::OK);
        assert_eq!(send(&server, "/metrics").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn download_zip_rejects_unknown_and_malformed_batches() {
        let temp = TempDir::new().expect("tempdir");
        let (server, _workspaces) = test_server(&temp);

        let unknown = uuid::Uuid::new_v4();
        assert_eq!(
            send(&server, &format!("/download_zip/{unknown}")).await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            send(&server, "/download_zip/not-a-batch-id").await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn download_zip_packages_an_existing_batch() {
        let temp = TempDir::new().expect("tempdir");
        let (server, workspaces) = test_server(&temp);

        let batch = workspaces.create_batch().expect("batch");
        std::fs::write(batch.dir().join("frame.ply"), b"cloud").expect("artifact");

        assert_eq!(
            send(&server, &format!("/download_zip/{}", batch.id())).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn upload_requires_a_multipart_body() {
        let temp = TempDir::new().expect("tempdir");
        let (server, _workspaces) = test_server(&temp);

        let response = server
            .router()
            .oneshot(
                HttpRequest::builder()
                    .method(Method::POST)
                    .uri("/upload_video")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert!(response.status().is_client_error());
    }
}
