//! Upsert-specific metrics helpers.

use super::definitions::{UPSERT_BATCHES_TOTAL, UPSERT_BATCH_DURATION, UPSERT_ROWS_TOTAL};
use crate::database::postgres::upsert::{OutcomeCounts, OutcomeKind};

/// Record a completed batch and the rows it classified.
pub fn record_batch_success(table: &str, counts: &OutcomeCounts, duration_secs: f64) {
    UPSERT_BATCHES_TOTAL.with_label_values(&[table, "success"]).inc();
    UPSERT_BATCH_DURATION.with_label_values(&[table]).observe(duration_secs);

    for kind in OutcomeKind::ALL {
        let count = counts.get(kind);
        if count > 0 {
            UPSERT_ROWS_TOTAL.with_label_values(&[table, kind.tag()]).inc_by(count as f64);
        }
    }

    if counts.dropped > 0 {
        UPSERT_ROWS_TOTAL.with_label_values(&[table, "dropped"]).inc_by(counts.dropped as f64);
    }
}

/// Record a failed batch.
pub fn record_batch_error(table: &str, duration_secs: f64) {
    UPSERT_BATCHES_TOTAL.with_label_values(&[table, "error"]).inc();
    UPSERT_BATCH_DURATION.with_label_values(&[table]).observe(duration_secs);
}
