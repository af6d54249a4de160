// public
pub mod metrics;
pub mod record;

mod database;
pub use database::postgres::{
    client::{
        connection_string, PostgresClient, PostgresConnection, PostgresConnectionError,
        PostgresError, PostgresTransaction, ToSql,
    },
    row_mapping::{row_to_field_map, rows_to_field_maps, RowDecodeError},
    schema::{get_table_columns, get_table_columns_in_transaction},
    sql_literal::{format_table_name, quote_identifier, quote_literal},
    upsert::{
        build_upsert_statement, classify_columns, split_batches, upsert, upsert_field_maps,
        upsert_field_maps_with_observer, upsert_with_observer, Batch, BatchFailure, BatchReport,
        ColumnDescriptor, ColumnPlan, OutcomeCounts, OutcomeKind, QueryExecutor, QuotedColumns,
        TableSchemaSource, TracingObserver, UpsertError, UpsertObserver, UpsertOptions,
        UpsertOptionsError, UpsertResult, DEFAULT_BATCH_SIZE, DEFAULT_TIMEOUT_SECS,
        OUTCOME_COLUMN,
    },
};
pub use record::{FieldMap, RecordError, TableConventions, UpsertRecord};

mod logger;
pub use logger::{parse_log_level, setup_info_logger, setup_logger};

// export 3rd party dependencies
pub use async_trait::async_trait;
pub use tokio::main as bulk_upsert_main;
pub use tracing::{error as bulk_upsert_error, info as bulk_upsert_info};
pub use tracing_subscriber::filter::LevelFilter;
