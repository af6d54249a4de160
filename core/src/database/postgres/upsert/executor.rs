//! The seams between the upsert engine and the database.
//!
//! The engine only needs two things: a way to run a statement and get its rows back
//! as field maps, and a way to look up a table's columns. Both are implemented for
//! the pooled [`PostgresClient`] and for a caller-owned [`PostgresTransaction`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use super::columns::ColumnDescriptor;
use crate::{
    database::postgres::{
        client::{PostgresClient, PostgresError, PostgresTransaction},
        row_mapping::rows_to_field_maps,
        schema::{get_table_columns, get_table_columns_in_transaction},
    },
    record::FieldMap,
};

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs `sql` without bind parameters and returns its rows. The statement is not
    /// kept prepared. Exceeding `limit` fails with [`PostgresError::Timeout`].
    async fn fetch_rows(&self, sql: &str, limit: Duration) -> Result<Vec<FieldMap>, PostgresError>;
}

#[async_trait]
pub trait TableSchemaSource: Send + Sync {
    /// Columns of `table_name` in declared order, or `None` when the table is unknown.
    async fn table_columns(
        &self,
        table_name: &str,
    ) -> Result<Option<Vec<ColumnDescriptor>>, PostgresError>;
}

#[async_trait]
impl QueryExecutor for PostgresClient {
    async fn fetch_rows(&self, sql: &str, limit: Duration) -> Result<Vec<FieldMap>, PostgresError> {
        let rows =
            timeout(limit, self.query(sql, &[])).await.map_err(|_| PostgresError::Timeout(limit))??;
        Ok(rows_to_field_maps(&rows))
    }
}

#[async_trait]
impl TableSchemaSource for PostgresClient {
    async fn table_columns(
        &self,
        table_name: &str,
    ) -> Result<Option<Vec<ColumnDescriptor>>, PostgresError> {
        get_table_columns(self, table_name).await
    }
}

#[async_trait]
impl QueryExecutor for PostgresTransaction<'_> {
    async fn fetch_rows(&self, sql: &str, limit: Duration) -> Result<Vec<FieldMap>, PostgresError> {
        let rows =
            timeout(limit, self.query(sql, &[])).await.map_err(|_| PostgresError::Timeout(limit))??;
        Ok(rows_to_field_maps(&rows))
    }
}

#[async_trait]
impl TableSchemaSource for PostgresTransaction<'_> {
    async fn table_columns(
        &self,
        table_name: &str,
    ) -> Result<Option<Vec<ColumnDescriptor>>, PostgresError> {
        get_table_columns_in_transaction(self, table_name).await
    }
}
