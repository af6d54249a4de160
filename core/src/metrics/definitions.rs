//! Prometheus metric definitions for bulk upserts.
//!
//! All metric registrations are centralized here for discoverability.
//! Metrics are lazily initialized on first access.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec,
};

// =============================================================================
// Upsert Metrics
// =============================================================================

/// Total upsert batches executed.
/// Labels: table, status (success/error)
pub static UPSERT_BATCHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bulk_upsert_batches_total",
        "Total number of upsert batches executed",
        &["table", "status"]
    )
    .expect("failed to register UPSERT_BATCHES_TOTAL")
});

/// Total rows reported back per outcome.
/// Labels: table, outcome (inserted/updated/unchanged/dropped)
pub static UPSERT_ROWS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bulk_upsert_rows_total",
        "Total number of rows returned by upsert batches",
        &["table", "outcome"]
    )
    .expect("failed to register UPSERT_ROWS_TOTAL")
});

/// Upsert batch duration histogram.
/// Labels: table
/// Buckets cover a single-row batch up to a batch close to the default timeout.
pub static UPSERT_BATCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "bulk_upsert_batch_duration_seconds",
        "Upsert batch duration in seconds",
        &["table"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0, 30.0, 60.0]
    )
    .expect("failed to register UPSERT_BATCH_DURATION")
});

// =============================================================================
// Build Info
// =============================================================================

/// Build information gauge (always 1, labels carry metadata).
/// Labels: version
pub static BUILD_INFO: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("bulk_upsert_build_info", "Build information", &["version"])
        .expect("failed to register BUILD_INFO")
});

/// Initialize build info metric with current version.
pub fn init_build_info(version: &str) {
    BUILD_INFO.with_label_values(&[version]).set(1.0);
}
