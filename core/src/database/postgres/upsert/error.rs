use crate::database::postgres::client::PostgresError;

#[derive(thiserror::Error, Debug)]
pub enum UpsertError {
    /// Raised before any statement is executed.
    #[error("Invalid upsert argument: {0}")]
    InvalidArgument(String),

    /// The connection, pool or statement failed, including timeouts. The failing batch
    /// aborts the call; earlier batches are left to the surrounding transaction.
    #[error("Upsert statement failed: {0}")]
    StoreExecution(#[from] PostgresError),

    /// The database returned an outcome tag outside the known set.
    #[error("Unexpected upsert result: {0}")]
    Protocol(String),
}
