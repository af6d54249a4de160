//! Outcome categories and folding of tagged result rows into an [`UpsertResult`].

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::error::UpsertError;
use crate::record::{FieldMap, RecordError};

/// Discriminator column carrying the outcome tag in every returned row.
pub const OUTCOME_COLUMN: &str = "__upsert_outcome";

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Inserted,
    Updated,
    Unchanged,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 3] =
        [OutcomeKind::Inserted, OutcomeKind::Updated, OutcomeKind::Unchanged];

    /// Stable tag written into generated statements.
    pub fn tag(&self) -> &'static str {
        match self {
            OutcomeKind::Inserted => "inserted",
            OutcomeKind::Updated => "updated",
            OutcomeKind::Unchanged => "unchanged",
        }
    }

    /// Name of the CTE producing rows of this kind.
    pub(crate) fn cte_name(&self) -> &'static str {
        match self {
            OutcomeKind::Inserted => "inserted_rows",
            OutcomeKind::Updated => "updated_rows",
            OutcomeKind::Unchanged => "unchanged_rows",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for OutcomeKind {
    type Err = UpsertError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "inserted" => Ok(OutcomeKind::Inserted),
            "updated" => Ok(OutcomeKind::Updated),
            "unchanged" => Ok(OutcomeKind::Unchanged),
            other => Err(UpsertError::Protocol(format!("unknown outcome tag '{}'", other))),
        }
    }
}

/// Rows grouped by outcome, in batch order then database return order.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertResult<T> {
    rows: HashMap<OutcomeKind, Vec<T>>,
}

impl<T> Default for UpsertResult<T> {
    fn default() -> Self {
        UpsertResult { rows: HashMap::new() }
    }
}

impl<T> UpsertResult<T> {
    pub fn get(&self, kind: OutcomeKind) -> &[T] {
        self.rows.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn inserted(&self) -> &[T] {
        self.get(OutcomeKind::Inserted)
    }

    pub fn updated(&self) -> &[T] {
        self.get(OutcomeKind::Updated)
    }

    pub fn unchanged(&self) -> &[T] {
        self.get(OutcomeKind::Unchanged)
    }

    /// Total number of rows across all outcomes.
    pub fn len(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, kind: OutcomeKind, row: T) {
        self.rows.entry(kind).or_default().push(row);
    }

    pub fn into_map(self) -> HashMap<OutcomeKind, Vec<T>> {
        self.rows
    }
}

/// Per-batch tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Rows that carried a valid tag but could not be turned back into a record.
    pub dropped: usize,
}

impl OutcomeCounts {
    fn record(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Inserted => self.inserted += 1,
            OutcomeKind::Updated => self.updated += 1,
            OutcomeKind::Unchanged => self.unchanged += 1,
        }
    }

    pub fn get(&self, kind: OutcomeKind) -> usize {
        match kind {
            OutcomeKind::Inserted => self.inserted,
            OutcomeKind::Updated => self.updated,
            OutcomeKind::Unchanged => self.unchanged,
        }
    }

    pub fn classified(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

fn take_outcome(row: &mut FieldMap) -> Result<OutcomeKind, UpsertError> {
    match row.remove(OUTCOME_COLUMN) {
        Some(Value::String(tag)) => tag.parse(),
        Some(other) => Err(UpsertError::Protocol(format!("unexpected outcome value {}", other))),
        None => Err(UpsertError::Protocol(format!("row is missing the {} column", OUTCOME_COLUMN))),
    }
}

/// Appends a batch's rows to `result`.
///
/// An unknown or missing tag fails the whole call. A row whose remaining fields do
/// not reconstruct into a record is logged and skipped.
pub fn classify_rows<T, F>(
    rows: Vec<FieldMap>,
    result: &mut UpsertResult<T>,
    reconstruct: &mut F,
) -> Result<OutcomeCounts, UpsertError>
where
    F: FnMut(FieldMap) -> Result<T, RecordError>,
{
    let mut counts = OutcomeCounts::default();

    for mut row in rows {
        let kind = take_outcome(&mut row)?;
        match reconstruct(row) {
            Ok(record) => {
                counts.record(kind);
                result.push(kind, record);
            }
            Err(e) => {
                warn!("Dropping {} row that could not be reconstructed: {}", kind, e);
                counts.dropped += 1;
            }
        }
    }

    Ok(counts)
}
