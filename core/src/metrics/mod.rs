//! Prometheus metrics for bulk upserts.
//!
//! Batches are counted by status, returned rows by outcome, and batch durations
//! go into a histogram, all labelled by table. The default upsert observer records
//! them, so callers only need to expose the registry.
//!
//! # Usage
//!
//! ```ignore
//! use bulk_upsert::metrics::{encode_metrics, upsert};
//!
//! upsert::record_batch_error("users", 0.005);
//!
//! let body = encode_metrics()?;
//! ```

pub mod definitions;
pub mod upsert;

// Re-export commonly used items
pub use definitions::init_build_info;

use prometheus::{Encoder, TextEncoder};

/// Encode all metrics to a string (for testing or custom endpoints).
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
