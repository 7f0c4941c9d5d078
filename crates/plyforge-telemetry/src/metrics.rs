//! Prometheus-backed metrics registry and exposition helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes a minimal set of counters/gauges relevant to the reconstruction
//!   pipeline.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::{TelemetryError, TelemetryResult};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    batches_started_total: IntCounterVec,
    frames_extracted_total: IntCounter,
    frames_converted_total: IntCounterVec,
    archives_built_total: IntCounter,
    notifications_unrouted_total: IntCounter,
    active_batches: IntGauge,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built
    /// or registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests received"),
            &["route", "code"],
        )
        .map_err(|source| TelemetryError::collector("http_requests_total", source))?;
        let batches_started_total = IntCounterVec::new(
            Opts::new("batches_started_total", "Upload batches started by kind"),
            &["kind"],
        )
        .map_err(|source| TelemetryError::collector("batches_started_total", source))?;
        let frames_extracted_total = IntCounter::new(
            "frames_extracted_total",
            "Frames produced by the extraction stage",
        )
        .map_err(|source| TelemetryError::collector("frames_extracted_total", source))?;
        let frames_converted_total = IntCounterVec::new(
            Opts::new(
                "frames_converted_total",
                "Per-frame conversion attempts by outcome",
            ),
            &["outcome"],
        )
        .map_err(|source| TelemetryError::collector("frames_converted_total", source))?;
        let archives_built_total = IntCounter::new(
            "archives_built_total",
            "Artifact archives assembled for download",
        )
        .map_err(|source| TelemetryError::collector("archives_built_total", source))?;
        let notifications_unrouted_total = IntCounter::new(
            "notifications_unrouted_total",
            "Progress notifications dropped for lack of a live subscriber",
        )
        .map_err(|source| TelemetryError::collector("notifications_unrouted_total", source))?;
        let active_batches = IntGauge::new("active_batches", "Batches currently processing")
            .map_err(|source| TelemetryError::collector("active_batches", source))?;

        registry
            .register(Box::new(http_requests_total.clone()))
            .map_err(|source| TelemetryError::register("http_requests_total", source))?;
        registry
            .register(Box::new(batches_started_total.clone()))
            .map_err(|source| TelemetryError::register("batches_started_total", source))?;
        registry
            .register(Box::new(frames_extracted_total.clone()))
            .map_err(|source| TelemetryError::register("frames_extracted_total", source))?;
        registry
            .register(Box::new(frames_converted_total.clone()))
            .map_err(|source| TelemetryError::register("frames_converted_total", source))?;
        registry
            .register(Box::new(archives_built_total.clone()))
            .map_err(|source| TelemetryError::register("archives_built_total", source))?;
        registry
            .register(Box::new(notifications_unrouted_total.clone()))
            .map_err(|source| TelemetryError::register("notifications_unrouted_total", source))?;
        registry
            .register(Box::new(active_batches.clone()))
            .map_err(|source| TelemetryError::register("active_batches", source))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                batches_started_total,
                frames_extracted_total,
                frames_converted_total,
                archives_built_total,
                notifications_unrouted_total,
                active_batches,
            }),
        })
    }

    /// Record one HTTP request for the given route and status code.
    pub fn inc_http_request(&self, route: &str, code: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &code.to_string()])
            .inc();
    }

    /// Record the start of a batch of the given kind (`image` or `video`).
    pub fn inc_batch_started(&self, kind: &str) {
        self.inner
            .batches_started_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record frames produced by one extraction run.
    pub fn add_frames_extracted(&self, count: u64) {
        self.inner.frames_extracted_total.inc_by(count);
    }

    /// Record one per-frame conversion attempt with its outcome
    /// (`ok`, `failed`, or `missing_output`).
    pub fn inc_frame_converted(&self, outcome: &str) {
        self.inner
            .frames_converted_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record one archive build.
    pub fn inc_archive_built(&self) {
        self.inner.archives_built_total.inc();
    }

    /// Record a progress notification that found no live subscriber.
    pub fn inc_notification_unrouted(&self) {
        self.inner.notifications_unrouted_total.inc();
    }

    /// Mark one batch as entering processing.
    pub fn inc_active_batches(&self) {
        self.inner.active_batches.inc();
    }

    /// Mark one batch as leaving processing.
    pub fn dec_active_batches(&self) {
        self.inner.active_batches.dec();
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the buffer is not valid UTF-8.
    pub fn render(&self) -> TelemetryResult<String> {
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }
}
