//! Table metadata lookup.
//!
//! Column types come from `format_type`, which renders them the way they are written
//! in DDL (`character varying(255)`, `numeric(10,2)`, `text[]`, enum names), so they
//! can be used directly as cast targets.

use tokio_postgres::Row;

use crate::database::postgres::{
    client::{PostgresClient, PostgresError, PostgresTransaction},
    sql_literal::format_table_name,
    upsert::ColumnDescriptor,
};

/// `to_regclass` yields NULL for unknown tables, which simply matches no rows.
const TABLE_COLUMNS_QUERY: &str = r#"
    SELECT a.attname::text, format_type(a.atttypid, a.atttypmod)
    FROM pg_catalog.pg_attribute a
    WHERE a.attrelid = to_regclass($1)
        AND a.attnum > 0
        AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

fn columns_from_rows(rows: &[Row]) -> Option<Vec<ColumnDescriptor>> {
    if rows.is_empty() {
        return None;
    }

    let columns = rows
        .iter()
        .map(|row| {
            let name: String = row.get(0);
            let database_type: Option<String> = row.get(1);
            ColumnDescriptor { name, database_type }
        })
        .collect();

    Some(columns)
}

/// Ordered columns of `table_name`, or `None` when the table does not exist.
pub async fn get_table_columns(
    client: &PostgresClient,
    table_name: &str,
) -> Result<Option<Vec<ColumnDescriptor>>, PostgresError> {
    let qualified = format_table_name(table_name);
    let rows = client.query(TABLE_COLUMNS_QUERY, &[&qualified]).await?;
    Ok(columns_from_rows(&rows))
}

/// Same as [`get_table_columns`], inside a caller-owned transaction so tables created
/// earlier in that transaction are visible.
pub async fn get_table_columns_in_transaction(
    transaction: &PostgresTransaction<'_>,
    table_name: &str,
) -> Result<Option<Vec<ColumnDescriptor>>, PostgresError> {
    let qualified = format_table_name(table_name);
    let rows = transaction.query(TABLE_COLUMNS_QUERY, &[&qualified]).await?;
    Ok(columns_from_rows(&rows))
}
