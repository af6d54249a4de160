use std::{collections::BTreeSet, fs, num::NonZeroUsize, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use super::{error::UpsertError, outcome::OutcomeKind};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
}

/// Durations as (possibly fractional) seconds, e.g. `timeout_secs: 1.5`.
mod duration_secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

fn default_returning() -> BTreeSet<OutcomeKind> {
    OutcomeKind::ALL.into_iter().collect()
}

#[derive(thiserror::Error, Debug)]
pub enum UpsertOptionsError {
    #[error("Could not read options file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not parse options file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Per-call settings for an upsert.
///
/// ```yaml
/// unique_by: [email]
/// batch_size: 500
/// excluded_from_change_detection: [id, created_at, updated_at, last_seen_at]
/// returning: [inserted, updated]
/// timeout_secs: 30
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOptions {
    /// Columns forming the conflict key. Must be non-empty and backed by a unique
    /// index or constraint on the table.
    pub unique_by: Vec<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Columns ignored when deciding whether a row changed. Empty means the record's
    /// identity, creation and modification columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_from_change_detection: Vec<String>,

    /// Columns never rewritten by an update. Empty means the record's identity and
    /// creation columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_updatable: Vec<String>,

    /// Outcome categories to return. Unrequested categories are still computed when
    /// the statement needs them, they just are not sent back.
    #[serde(default = "default_returning")]
    pub returning: BTreeSet<OutcomeKind>,

    /// Per-statement timeout. Read from and written to `timeout_secs`.
    #[serde(rename = "timeout_secs", default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,
}

impl UpsertOptions {
    pub fn new<I, S>(unique_by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        UpsertOptions {
            unique_by: unique_by.into_iter().map(Into::into).collect(),
            batch_size: DEFAULT_BATCH_SIZE,
            excluded_from_change_detection: Vec::new(),
            non_updatable: Vec::new(),
            returning: default_returning(),
            timeout: default_timeout(),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, UpsertOptionsError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, UpsertOptionsError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_excluded_from_change_detection<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_from_change_detection = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_non_updatable<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_updatable = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_returning(mut self, kinds: impl IntoIterator<Item = OutcomeKind>) -> Self {
        self.returning = kinds.into_iter().collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Checks the arguments that can be rejected without touching the database and
    /// returns the batch size.
    pub fn validate(&self) -> Result<NonZeroUsize, UpsertError> {
        if self.unique_by.is_empty() {
            return Err(UpsertError::InvalidArgument("unique_by must name at least one column".to_string()));
        }

        if self.timeout.is_zero() {
            return Err(UpsertError::InvalidArgument("timeout must be greater than 0".to_string()));
        }

        NonZeroUsize::new(self.batch_size)
            .ok_or_else(|| UpsertError::InvalidArgument("batch_size must be greater than 0".to_string()))
    }
}
