use std::time::Instant;

use tracing::{debug, warn};

use super::{
    batch::split_batches,
    columns::classify_columns,
    error::UpsertError,
    executor::{QueryExecutor, TableSchemaSource},
    observer::{BatchFailure, BatchReport, TracingObserver, UpsertObserver},
    options::UpsertOptions,
    outcome::{classify_rows, OutcomeKind, UpsertResult},
    statement::build_upsert_statement,
};
use crate::record::{FieldMap, RecordError, TableConventions, UpsertRecord};

/// Upserts typed records into `T::TABLE_NAME`.
///
/// Records are written in batches of `options.batch_size`, one statement per batch,
/// in input order. Every returned row is mapped back to a `T` and grouped by what
/// happened to it. Against a [`PostgresTransaction`] all batches run inside that
/// transaction and committing stays with the caller; against a
/// [`PostgresClient`] each batch commits on its own.
///
/// [`PostgresTransaction`]: crate::PostgresTransaction
/// [`PostgresClient`]: crate::PostgresClient
pub async fn upsert<T, E>(
    executor: &E,
    records: &[T],
    options: &UpsertOptions,
) -> Result<UpsertResult<T>, UpsertError>
where
    T: UpsertRecord,
    E: QueryExecutor + TableSchemaSource + ?Sized,
{
    upsert_with_observer(executor, records, options, &TracingObserver).await
}

pub async fn upsert_with_observer<T, E>(
    executor: &E,
    records: &[T],
    options: &UpsertOptions,
    observer: &dyn UpsertObserver,
) -> Result<UpsertResult<T>, UpsertError>
where
    T: UpsertRecord,
    E: QueryExecutor + TableSchemaSource + ?Sized,
{
    let rows = records
        .iter()
        .map(|record| {
            record.to_field_map().map_err(|e| {
                UpsertError::InvalidArgument(format!("record cannot be written: {}", e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    run_upsert(executor, &T::conventions(), &rows, options, observer, T::from_field_map).await
}

/// Upserts untyped rows. Returned rows come back as field maps without the outcome
/// column.
pub async fn upsert_field_maps<E>(
    executor: &E,
    conventions: &TableConventions,
    rows: &[FieldMap],
    options: &UpsertOptions,
) -> Result<UpsertResult<FieldMap>, UpsertError>
where
    E: QueryExecutor + TableSchemaSource + ?Sized,
{
    upsert_field_maps_with_observer(executor, conventions, rows, options, &TracingObserver).await
}

pub async fn upsert_field_maps_with_observer<E>(
    executor: &E,
    conventions: &TableConventions,
    rows: &[FieldMap],
    options: &UpsertOptions,
    observer: &dyn UpsertObserver,
) -> Result<UpsertResult<FieldMap>, UpsertError>
where
    E: QueryExecutor + TableSchemaSource + ?Sized,
{
    run_upsert(executor, conventions, rows, options, observer, Ok).await
}

async fn run_upsert<T, E, F>(
    executor: &E,
    conventions: &TableConventions,
    rows: &[FieldMap],
    options: &UpsertOptions,
    observer: &dyn UpsertObserver,
    mut reconstruct: F,
) -> Result<UpsertResult<T>, UpsertError>
where
    E: QueryExecutor + TableSchemaSource + ?Sized,
    F: FnMut(FieldMap) -> Result<T, RecordError>,
{
    let batch_size = options.validate()?;
    let mut result = UpsertResult::default();

    if rows.is_empty() {
        return Ok(result);
    }

    let table = conventions.table_name.as_str();
    let table_columns = executor.table_columns(table).await?.unwrap_or_default();
    let plan = classify_columns(conventions, &table_columns, rows, options)?;

    if plan.skip_update && options.returning.contains(&OutcomeKind::Updated) {
        warn!(
            table,
            "No updatable columns left after removing unique_by and non_updatable columns, \
             no rows will be reported as updated"
        );
    }

    let mut total_classified = 0;

    for batch in split_batches(rows, batch_size) {
        let statement = build_upsert_statement(&plan, batch.rows, &options.returning);
        debug!(table, batch = batch.index, "Upsert statement:\n{}", statement);

        let started = Instant::now();
        let returned = match executor.fetch_rows(&statement, options.timeout()).await {
            Ok(returned) => returned,
            Err(e) => {
                observer.batch_failed(&BatchFailure {
                    table,
                    index: batch.index,
                    size: batch.len(),
                    elapsed: started.elapsed(),
                    statement: &statement,
                    error: &e,
                });
                return Err(UpsertError::StoreExecution(e));
            }
        };
        let elapsed = started.elapsed();

        let counts = classify_rows(returned, &mut result, &mut reconstruct)?;
        total_classified += counts.classified();

        observer.batch_succeeded(&BatchReport {
            table,
            index: batch.index,
            size: batch.len(),
            elapsed,
            counts,
            total_classified,
        });
    }

    Ok(result)
}
