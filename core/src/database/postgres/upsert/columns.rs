//! Works out which columns an upsert writes, compares and returns.
//!
//! Runs once per call. Everything downstream (statement rendering for every batch)
//! works from the resulting [`ColumnPlan`].

use std::collections::{HashMap, HashSet};

use super::{error::UpsertError, options::UpsertOptions};
use crate::{
    database::postgres::sql_literal::{format_table_name, quote_identifier},
    record::{FieldMap, TableConventions},
};

/// A table column as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Native type usable as a cast target, e.g. `character varying(64)`.
    pub database_type: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, database_type: Option<&str>) -> Self {
        ColumnDescriptor { name: name.into(), database_type: database_type.map(str::to_string) }
    }

    pub fn quoted_name(&self) -> String {
        quote_identifier(&self.name)
    }

    pub fn database_type(&self) -> Option<&str> {
        self.database_type.as_deref()
    }
}

/// Quoted column names per role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotedColumns {
    pub participating: Vec<String>,
    pub unique_by: Vec<String>,
    pub excluded_from_change_detection: HashSet<String>,
    pub non_updatable: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct ColumnPlan {
    /// Quoted, possibly schema-qualified table name.
    pub table_name: String,
    /// Written columns, in table order.
    pub participating: Vec<ColumnDescriptor>,
    /// Conflict key columns, in `unique_by` order.
    pub unique_by: Vec<ColumnDescriptor>,
    /// Columns assigned by the update path.
    pub set_columns: Vec<ColumnDescriptor>,
    /// Columns whose difference makes a row an update candidate.
    pub compare_columns: Vec<ColumnDescriptor>,
    /// Projection shared by every result branch: the identity column (when the table
    /// has one and it is not written) followed by the participating columns.
    pub returned: Vec<ColumnDescriptor>,
    pub types: HashMap<String, Option<String>>,
    pub quoted: QuotedColumns,
    /// No column is left to update, so the update branch is left out.
    pub skip_update: bool,
}

fn resolve_roles(explicit: &[String], defaults: Vec<String>) -> HashSet<String> {
    if explicit.is_empty() {
        defaults.into_iter().collect()
    } else {
        explicit.iter().cloned().collect()
    }
}

/// Classifies the table's columns for one call.
///
/// `table_columns` must be the table's columns in their declared order.
pub fn classify_columns(
    conventions: &TableConventions,
    table_columns: &[ColumnDescriptor],
    rows: &[FieldMap],
    options: &UpsertOptions,
) -> Result<ColumnPlan, UpsertError> {
    if options.unique_by.is_empty() {
        return Err(UpsertError::InvalidArgument("unique_by must name at least one column".to_string()));
    }

    if table_columns.is_empty() {
        return Err(UpsertError::InvalidArgument(format!(
            "no table metadata found for {}",
            conventions.table_name
        )));
    }

    let supplied: HashSet<&str> = rows.iter().flat_map(|row| row.keys().map(String::as_str)).collect();
    let by_name: HashMap<&str, &ColumnDescriptor> =
        table_columns.iter().map(|column| (column.name.as_str(), column)).collect();

    let mut unique_by = Vec::with_capacity(options.unique_by.len());
    for name in &options.unique_by {
        let column = by_name.get(name.as_str()).ok_or_else(|| {
            UpsertError::InvalidArgument(format!(
                "unique_by column '{}' does not exist on {}",
                name, conventions.table_name
            ))
        })?;
        if !supplied.contains(name.as_str()) {
            return Err(UpsertError::InvalidArgument(format!(
                "unique_by column '{}' is not present in any record",
                name
            )));
        }
        if !unique_by.contains(*column) {
            unique_by.push((*column).clone());
        }
    }

    let key_names: HashSet<&str> = unique_by.iter().map(|c| c.name.as_str()).collect();
    let identity = conventions.identity_column.as_str();

    let participating: Vec<ColumnDescriptor> = table_columns
        .iter()
        .filter(|column| supplied.contains(column.name.as_str()))
        .filter(|column| column.name != identity || key_names.contains(identity))
        .cloned()
        .collect();

    let excluded = resolve_roles(
        &options.excluded_from_change_detection,
        conventions.default_excluded_from_change_detection(),
    );
    let non_updatable =
        resolve_roles(&options.non_updatable, conventions.default_non_updatable());

    let set_columns: Vec<ColumnDescriptor> = participating
        .iter()
        .filter(|c| !key_names.contains(c.name.as_str()) && !non_updatable.contains(&c.name))
        .cloned()
        .collect();

    // Non-updatable columns still count as a difference.
    let compare_columns: Vec<ColumnDescriptor> = participating
        .iter()
        .filter(|c| !key_names.contains(c.name.as_str()) && !excluded.contains(&c.name))
        .cloned()
        .collect();

    let mut returned = Vec::with_capacity(participating.len() + 1);
    if let Some(identity_column) = by_name.get(identity) {
        if !participating.iter().any(|c| c.name == identity) {
            returned.push((*identity_column).clone());
        }
    }
    returned.extend(participating.iter().cloned());

    let quoted = QuotedColumns {
        participating: participating.iter().map(ColumnDescriptor::quoted_name).collect(),
        unique_by: unique_by.iter().map(ColumnDescriptor::quoted_name).collect(),
        excluded_from_change_detection: excluded.iter().map(|name| quote_identifier(name)).collect(),
        non_updatable: non_updatable.iter().map(|name| quote_identifier(name)).collect(),
    };

    let types = table_columns
        .iter()
        .map(|column| (column.name.clone(), column.database_type.clone()))
        .collect();

    Ok(ColumnPlan {
        table_name: format_table_name(&conventions.table_name),
        skip_update: set_columns.is_empty(),
        participating,
        unique_by,
        set_columns,
        compare_columns,
        returned,
        types,
        quoted,
    })
}
