//! Per-batch events emitted by the engine.

use std::time::Duration;

use tracing::{debug, error, info};

use super::outcome::OutcomeCounts;
use crate::{database::postgres::client::PostgresError, metrics};

/// A batch that ran and had its rows classified.
#[derive(Debug, Clone)]
pub struct BatchReport<'a> {
    pub table: &'a str,
    pub index: usize,
    pub size: usize,
    pub elapsed: Duration,
    pub counts: OutcomeCounts,
    /// Rows classified so far in this call, this batch included.
    pub total_classified: usize,
}

/// A batch whose statement failed or timed out.
#[derive(Debug)]
pub struct BatchFailure<'a> {
    pub table: &'a str,
    pub index: usize,
    pub size: usize,
    pub elapsed: Duration,
    pub statement: &'a str,
    pub error: &'a PostgresError,
}

/// Receives batch events. Implementations must not block, they run inline with the
/// upsert.
pub trait UpsertObserver: Send + Sync {
    fn batch_succeeded(&self, report: &BatchReport<'_>);

    fn batch_failed(&self, failure: &BatchFailure<'_>);
}

/// Logs batches through `tracing` and records them in the Prometheus registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl UpsertObserver for TracingObserver {
    fn batch_succeeded(&self, report: &BatchReport<'_>) {
        metrics::upsert::record_batch_success(
            report.table,
            &report.counts,
            report.elapsed.as_secs_f64(),
        );

        info!(
            table = report.table,
            batch = report.index,
            size = report.size,
            inserted = report.counts.inserted,
            updated = report.counts.updated,
            unchanged = report.counts.unchanged,
            total = report.total_classified,
            "Upserted batch in {:?}",
            report.elapsed
        );

        if report.counts.dropped > 0 {
            debug!(
                table = report.table,
                batch = report.index,
                "{} returned rows could not be mapped back to records",
                report.counts.dropped
            );
        }
    }

    fn batch_failed(&self, failure: &BatchFailure<'_>) {
        metrics::upsert::record_batch_error(failure.table, failure.elapsed.as_secs_f64());

        error!(
            table = failure.table,
            batch = failure.index,
            size = failure.size,
            "Upsert batch failed after {:?}: {} - statement: {}",
            failure.elapsed,
            failure.error,
            failure.statement
        );
    }
}
