//! Batched, conflict-resolving bulk upsert.
//!
//! One call takes a set of records and a conflict key and, batch by batch, inserts
//! new rows, updates rows whose content differs and leaves the rest alone. Every
//! affected row comes back tagged with what happened to it.
//!
//! ```ignore
//! let options = UpsertOptions::new(["email"]).with_batch_size(500);
//! let result = upsert(&client, &users, &options).await?;
//!
//! for user in result.updated() {
//!     info!("{} changed", user.email);
//! }
//! ```

mod batch;
mod columns;
mod engine;
mod error;
mod executor;
mod observer;
mod options;
mod outcome;
mod statement;

pub use batch::{split_batches, Batch};
pub use columns::{classify_columns, ColumnDescriptor, ColumnPlan, QuotedColumns};
pub use engine::{upsert, upsert_field_maps, upsert_field_maps_with_observer, upsert_with_observer};
pub use error::UpsertError;
pub use executor::{QueryExecutor, TableSchemaSource};
pub use observer::{BatchFailure, BatchReport, TracingObserver, UpsertObserver};
pub use options::{UpsertOptions, UpsertOptionsError, DEFAULT_BATCH_SIZE, DEFAULT_TIMEOUT_SECS};
pub use outcome::{OutcomeCounts, OutcomeKind, UpsertResult, OUTCOME_COLUMN};
pub use statement::build_upsert_statement;
