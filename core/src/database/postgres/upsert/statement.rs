//! SQL generation for one upsert batch.
//!
//! Each batch becomes a single statement built from these CTEs:
//!
//! - `input_values`: the batch as a literal `VALUES` table
//! - `inserted_rows`: `INSERT ... ON CONFLICT (<keys>) DO NOTHING RETURNING ...`
//! - `updated_rows`: `UPDATE ... FROM input_values` limited to rows that differ
//! - `unchanged_rows`: existing rows whose key was neither inserted nor updated
//!
//! followed by a `UNION ALL` of the requested categories, tagged with
//! [`OUTCOME_COLUMN`]. All CTEs see the same snapshot of the table, so
//! `unchanged_rows` removes inserted and updated keys explicitly.

use std::collections::BTreeSet;

use serde_json::Value;

use super::{
    columns::{ColumnDescriptor, ColumnPlan},
    outcome::{OutcomeKind, OUTCOME_COLUMN},
};
use crate::{
    database::postgres::{
        row_mapping::decodes_natively,
        sql_literal::{encode_cast_literal, encode_literal, is_plain_json_type},
    },
    record::FieldMap,
};

const INPUT_VALUES: &str = "input_values";
const TARGET: &str = "target";
const PENDING: &str = "pending";

fn column_list(columns: &[ColumnDescriptor]) -> String {
    columns.iter().map(ColumnDescriptor::quoted_name).collect::<Vec<_>>().join(", ")
}

fn qualified_list(qualifier: &str, columns: &[ColumnDescriptor]) -> String {
    columns
        .iter()
        .map(|column| format!("{}.{}", qualifier, column.quoted_name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `qualifier.column` in a form that supports equality. Plain `json` has no equality
/// operator and compares formatting, so it is compared as `jsonb`.
fn comparable(qualifier: &str, column: &ColumnDescriptor) -> String {
    if is_plain_json_type(column.database_type()) {
        format!("{}.{}::jsonb", qualifier, column.quoted_name())
    } else {
        format!("{}.{}", qualifier, column.quoted_name())
    }
}

/// Final projection. Columns the row decoder has no binary mapping for come back as
/// text, so one exotic column cannot make every returned row undecodable.
fn result_list(columns: &[ColumnDescriptor]) -> String {
    columns
        .iter()
        .map(|column| {
            if decodes_natively(column.database_type()) {
                column.quoted_name()
            } else {
                format!("{}::text AS {}", column.quoted_name(), column.quoted_name())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Key projection used on both sides of `EXCEPT`.
fn key_projection(qualifier: &str, keys: &[ColumnDescriptor]) -> String {
    keys.iter()
        .map(|key| {
            let expression = comparable(qualifier, key);
            if is_plain_json_type(key.database_type()) {
                format!("{} AS {}", expression, key.quoted_name())
            } else {
                expression
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Null-safe match of every key column between two relations.
fn keys_match(left: &str, right: &str, keys: &[ColumnDescriptor]) -> String {
    keys.iter()
        .map(|key| {
            format!("{} IS NOT DISTINCT FROM {}", comparable(left, key), comparable(right, key))
        })
        .collect::<Vec<_>>()
        .join("\n            AND ")
}

fn value_of<'a>(row: &'a FieldMap, column: &ColumnDescriptor) -> &'a Value {
    row.get(&column.name).unwrap_or(&Value::Null)
}

/// Builds `WITH input_values (<cols>) AS (VALUES ...)`.
///
/// The first row carries an explicit cast per column so the column types are fixed
/// even when later rows only hold untyped literals or `NULL`. A record that lacks
/// a participating field contributes `NULL` for it.
pub fn build_input_values_cte(plan: &ColumnPlan, batch: &[FieldMap]) -> String {
    let rows = batch
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let literals = plan
                .participating
                .iter()
                .map(|column| {
                    let value = value_of(row, column);
                    if index == 0 {
                        encode_cast_literal(value, column.database_type())
                    } else {
                        encode_literal(value, column.database_type())
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", literals)
        })
        .collect::<Vec<_>>()
        .join(",\n        ");

    format!(
        "WITH {} ({}) AS (\n    VALUES\n        {}\n)",
        INPUT_VALUES,
        plan.quoted.participating.join(", "),
        rows
    )
}

/// Builds the `inserted_rows` CTE. Rows whose key already exists are left to the
/// other branches.
pub fn build_inserted_rows_cte(plan: &ColumnPlan) -> String {
    let columns = plan.quoted.participating.join(", ");

    format!(
        "{} AS (\n    INSERT INTO {} ({})\n    SELECT {}\n    FROM {}\n    ON CONFLICT ({}) DO NOTHING\n    RETURNING {}\n)",
        OutcomeKind::Inserted.cte_name(),
        plan.table_name,
        columns,
        columns,
        INPUT_VALUES,
        plan.quoted.unique_by.join(", "),
        column_list(&plan.returned)
    )
}

/// Builds the `updated_rows` CTE, or `None` when there is nothing to update.
pub fn build_updated_rows_cte(plan: &ColumnPlan) -> Option<String> {
    if plan.skip_update {
        return None;
    }

    let set_clauses = plan
        .set_columns
        .iter()
        .map(|column| format!("{} = {}.{}", column.quoted_name(), INPUT_VALUES, column.quoted_name()))
        .collect::<Vec<_>>()
        .join(",\n        ");

    let mut conditions = vec![keys_match(TARGET, INPUT_VALUES, &plan.unique_by)];

    if !plan.compare_columns.is_empty() {
        let differs = plan
            .compare_columns
            .iter()
            .map(|column| {
                format!(
                    "{} IS DISTINCT FROM {}",
                    comparable(TARGET, column),
                    comparable(INPUT_VALUES, column)
                )
            })
            .collect::<Vec<_>>()
            .join("\n            OR ");
        conditions.push(format!("(\n            {}\n        )", differs));
    }

    let inserted = OutcomeKind::Inserted.cte_name();
    conditions.push(format!(
        "NOT EXISTS (\n            SELECT 1 FROM {}\n            WHERE {}\n        )",
        inserted,
        keys_match(inserted, INPUT_VALUES, &plan.unique_by)
    ));

    Some(format!(
        "{} AS (\n    UPDATE {} AS {}\n    SET {}\n    FROM {}\n    WHERE {}\n    RETURNING {}\n)",
        OutcomeKind::Updated.cte_name(),
        plan.table_name,
        TARGET,
        set_clauses,
        INPUT_VALUES,
        conditions.join("\n        AND "),
        qualified_list(TARGET, &plan.returned)
    ))
}

/// Builds the `unchanged_rows` CTE: current rows for the input keys, minus every key
/// claimed by `inserted_rows` or `updated_rows`.
pub fn build_unchanged_rows_cte(plan: &ColumnPlan) -> String {
    let mut pending_keys = vec![format!(
        "SELECT {} FROM {}",
        key_projection(INPUT_VALUES, &plan.unique_by),
        INPUT_VALUES
    )];

    let mut claimed = vec![OutcomeKind::Inserted];
    if !plan.skip_update {
        claimed.push(OutcomeKind::Updated);
    }
    for kind in claimed {
        pending_keys.push(format!(
            "SELECT {} FROM {}",
            key_projection(kind.cte_name(), &plan.unique_by),
            kind.cte_name()
        ));
    }

    format!(
        "{} AS (\n    SELECT {}\n    FROM {} AS {}\n    JOIN (\n        {}\n    ) AS {}\n    ON {}\n)",
        OutcomeKind::Unchanged.cte_name(),
        qualified_list(TARGET, &plan.returned),
        plan.table_name,
        TARGET,
        pending_keys.join("\n        EXCEPT\n        "),
        PENDING,
        keys_match(TARGET, PENDING, &plan.unique_by)
    )
}

/// Builds the final tagged `UNION ALL` over the requested categories that the
/// statement actually produces.
pub fn build_results_select(plan: &ColumnPlan, returning: &BTreeSet<OutcomeKind>) -> String {
    let columns = result_list(&plan.returned);

    let branches = returning
        .iter()
        .filter(|kind| !(plan.skip_update && **kind == OutcomeKind::Updated))
        .map(|kind| {
            format!(
                "SELECT {}, '{}'::text AS \"{}\" FROM {}",
                columns,
                kind.tag(),
                OUTCOME_COLUMN,
                kind.cte_name()
            )
        })
        .collect::<Vec<_>>();

    if branches.is_empty() {
        return format!("SELECT NULL::text AS \"{}\" WHERE false", OUTCOME_COLUMN);
    }

    branches.join("\nUNION ALL\n")
}

/// Renders the complete statement for one batch. `batch` must not be empty.
pub fn build_upsert_statement(
    plan: &ColumnPlan,
    batch: &[FieldMap],
    returning: &BTreeSet<OutcomeKind>,
) -> String {
    let mut ctes = vec![build_input_values_cte(plan, batch), build_inserted_rows_cte(plan)];

    if let Some(updated) = build_updated_rows_cte(plan) {
        ctes.push(updated);
    }

    if returning.contains(&OutcomeKind::Unchanged) {
        ctes.push(build_unchanged_rows_cte(plan));
    }

    format!("{}\n{}", ctes.join(",\n"), build_results_select(plan, returning))
}
