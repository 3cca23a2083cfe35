//! Prometheus metrics for the depot server.
//!
//! Exposes counters for uploads, content dedup, chunk sessions, downloads and deletes.
//!
//! The `/metrics` endpoint is unauthenticated and should be restricted to the
//! scraper's network at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Single-shot upload metrics
pub static FILES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_files_uploaded_total",
        "Total number of logical files created by uploads",
    )
    .expect("metric creation failed")
});

pub static FILES_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_files_deduplicated_total",
        "Total number of uploads satisfied by existing content",
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_bytes_uploaded_total",
        "Total bytes written to the storage backend",
    )
    .expect("metric creation failed")
});

pub static BYTES_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_bytes_deduplicated_total",
        "Total bytes not transferred thanks to deduplication",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_HASH_MISMATCHES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_upload_hash_mismatches_total",
        "Total single-shot uploads whose client hash differed from the stored bytes",
    )
    .expect("metric creation failed")
});

// Chunked upload metrics
pub static UPLOAD_SESSIONS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_upload_sessions_created_total",
        "Total number of resumable upload sessions created",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_upload_sessions_completed_total",
        "Total number of resumable upload sessions merged into a file",
    )
    .expect("metric creation failed")
});

pub static CHUNKS_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("depot_chunks_uploaded_total", "Total number of chunks stored")
        .expect("metric creation failed")
});

pub static CHUNKS_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_chunks_deduplicated_total",
        "Total number of chunk retries skipped because the chunk was already stored",
    )
    .expect("metric creation failed")
});

pub static CHUNK_HASH_MISMATCHES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_chunk_hash_mismatches_total",
        "Total number of rejected chunks whose hash did not match",
    )
    .expect("metric creation failed")
});

pub static MERGE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "depot_merge_duration_seconds",
            "Time taken to merge the chunks of an upload session",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

// Retrieval and lifecycle metrics
pub static DOWNLOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("depot_downloads_total", "Total downloads by response kind"),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static FILES_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("depot_files_deleted_total", "Total logical files deleted")
        .expect("metric creation failed")
});

pub static BLOBS_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_blobs_deleted_total",
        "Total content blobs removed after their last reference was deleted",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("depot_upload_errors_total", "Total upload errors by error type"),
        &["error_type"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests can build many routers in one process.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(FILES_UPLOADED.clone()),
            Box::new(FILES_DEDUPLICATED.clone()),
            Box::new(BYTES_UPLOADED.clone()),
            Box::new(BYTES_DEDUPLICATED.clone()),
            Box::new(UPLOAD_HASH_MISMATCHES.clone()),
            Box::new(UPLOAD_SESSIONS_CREATED.clone()),
            Box::new(UPLOAD_SESSIONS_COMPLETED.clone()),
            Box::new(CHUNKS_UPLOADED.clone()),
            Box::new(CHUNKS_DEDUPLICATED.clone()),
            Box::new(CHUNK_HASH_MISMATCHES.clone()),
            Box::new(MERGE_DURATION.clone()),
            Box::new(DOWNLOADS.clone()),
            Box::new(FILES_DELETED.clone()),
            Box::new(BLOBS_DELETED.clone()),
            Box::new(UPLOAD_ERRORS.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Helper to record upload errors by type.
pub fn record_upload_error(error_type: &str) {
    UPLOAD_ERRORS.with_label_values(&[error_type]).inc();
}
