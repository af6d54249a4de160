//! Records and the field maps the upsert engine works on.
//!
//! The engine never looks inside a typed record. It converts each one into a
//! [`FieldMap`] (field name -> JSON value), renders statements from those maps and
//! turns returned rows back into records through [`UpsertRecord::from_field_map`].

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Field name -> value map for one record or one returned row.
pub type FieldMap = serde_json::Map<String, Value>;

#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("Record did not serialize to a JSON object")]
    NotAnObject,

    #[error("Could not convert record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The table a set of records is written to, plus the columns that get special
/// treatment by default (identity and bookkeeping timestamps).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConventions {
    pub table_name: String,
    pub identity_column: String,
    pub created_at_column: Option<String>,
    pub updated_at_column: Option<String>,
}

impl TableConventions {
    /// Conventions with an `id` identity column and `created_at` / `updated_at` timestamps.
    pub fn new(table_name: impl Into<String>) -> Self {
        TableConventions {
            table_name: table_name.into(),
            identity_column: "id".to_string(),
            created_at_column: Some("created_at".to_string()),
            updated_at_column: Some("updated_at".to_string()),
        }
    }

    pub fn with_identity_column(mut self, column: impl Into<String>) -> Self {
        self.identity_column = column.into();
        self
    }

    pub fn with_created_at_column(mut self, column: Option<String>) -> Self {
        self.created_at_column = column;
        self
    }

    pub fn with_updated_at_column(mut self, column: Option<String>) -> Self {
        self.updated_at_column = column;
        self
    }

    /// Identity, creation and modification columns.
    pub fn default_excluded_from_change_detection(&self) -> Vec<String> {
        let mut columns = vec![self.identity_column.clone()];
        columns.extend(self.created_at_column.iter().cloned());
        columns.extend(self.updated_at_column.iter().cloned());
        columns
    }

    /// Identity and creation columns.
    pub fn default_non_updatable(&self) -> Vec<String> {
        let mut columns = vec![self.identity_column.clone()];
        columns.extend(self.created_at_column.iter().cloned());
        columns
    }
}

/// A typed row that can be upserted.
///
/// Conversions default to serde, so most implementations only name their table:
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     #[serde(skip_serializing_if = "Option::is_none")]
///     id: Option<i64>,
///     email: String,
///     name: String,
/// }
///
/// impl UpsertRecord for User {
///     const TABLE_NAME: &'static str = "users";
/// }
/// ```
///
/// A column only takes part in the statement when at least one record carries the
/// field, so optional fields that should keep their database value must be skipped
/// when serializing rather than written as `null`.
pub trait UpsertRecord: Serialize + DeserializeOwned {
    /// Table name, optionally schema qualified (`schema.table`).
    const TABLE_NAME: &'static str;
    const IDENTITY_COLUMN: &'static str = "id";
    const CREATED_AT_COLUMN: Option<&'static str> = Some("created_at");
    const UPDATED_AT_COLUMN: Option<&'static str> = Some("updated_at");

    fn conventions() -> TableConventions {
        TableConventions {
            table_name: Self::TABLE_NAME.to_string(),
            identity_column: Self::IDENTITY_COLUMN.to_string(),
            created_at_column: Self::CREATED_AT_COLUMN.map(str::to_string),
            updated_at_column: Self::UPDATED_AT_COLUMN.map(str::to_string),
        }
    }

    fn to_field_map(&self) -> Result<FieldMap, RecordError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(RecordError::NotAnObject),
        }
    }

    fn from_field_map(map: FieldMap) -> Result<Self, RecordError> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}
