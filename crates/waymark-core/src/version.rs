//! Schema version identity and persisted version records.

use crate::backend::Value;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Uniquely identifies a database schema version.
///
/// Versions form a single total order. Authors may use any numbering scheme,
/// such as sequential integers or timestamps like `20240131093000`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VersionId(pub i64);

impl VersionId {
    /// Reserved id meaning "no version applied".
    pub const EMPTY: VersionId = VersionId(0);

    /// The raw integer value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for VersionId {
    fn from(id: i64) -> Self {
        VersionId(id)
    }
}

impl From<VersionId> for i64 {
    fn from(id: VersionId) -> Self {
        id.0
    }
}

/// Lifecycle state of a single version, as recorded in the version table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// No row exists for this version.
    Unapplied,
    /// A non-transactional migration was started but never confirmed.
    /// The database needs manual repair followed by a force.
    Failed,
    /// The migration completed (or a failure was cleared by force).
    Applied,
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionStatus::Unapplied => write!(f, "unapplied"),
            VersionStatus::Failed => write!(f, "failed"),
            VersionStatus::Applied => write!(f, "applied"),
        }
    }
}

/// Information about a database schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// Schema version id.
    pub id: VersionId,
    /// When the migration was applied, or `None` if not applied.
    pub applied_at: Option<DateTime<FixedOffset>>,
    /// Whether a non-transactional migration failed part way.
    pub failed: bool,
    /// Whether down migrations past this version are prevented.
    pub locked: bool,
    /// SQL for the up migration, or a marker for function migrations.
    pub up: String,
    /// SQL for the down migration, or a marker for function migrations.
    pub down: String,
}

impl Version {
    /// A version that has not been applied.
    pub fn unapplied(id: VersionId) -> Self {
        Self {
            id,
            applied_at: None,
            failed: false,
            locked: false,
            up: String::new(),
            down: String::new(),
        }
    }

    /// A version applied at the given time.
    pub fn applied(id: VersionId, applied_at: DateTime<Utc>) -> Self {
        Self {
            applied_at: Some(applied_at.into()),
            ..Self::unapplied(id)
        }
    }

    /// Mark the version as failed.
    pub fn with_failed(mut self, failed: bool) -> Self {
        self.failed = failed;
        self
    }

    /// Check if a row exists for this version.
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }

    /// Project the persisted flags onto the version lifecycle.
    pub fn status(&self) -> VersionStatus {
        match (self.applied_at.is_some(), self.failed) {
            (false, _) => VersionStatus::Unapplied,
            (true, true) => VersionStatus::Failed,
            (true, false) => VersionStatus::Applied,
        }
    }
}

const TEXT_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

fn unix_epoch() -> DateTime<FixedOffset> {
    DateTime::<Utc>::default().into()
}

/// Decode an `applied_at` column value.
///
/// Backends store timestamps differently: SQLite keeps text or integers,
/// others return native timestamps. Anything that cannot be understood
/// decodes to the Unix epoch rather than failing.
pub fn decode_applied_at(value: &Value) -> DateTime<FixedOffset> {
    match value {
        Value::Timestamp(ts) => *ts,
        Value::Integer(secs) => Utc
            .timestamp_opt(*secs, 0)
            .single()
            .map(Into::into)
            .unwrap_or_else(unix_epoch),
        Value::Text(text) => {
            for format in TEXT_FORMATS {
                if let Ok(ts) = DateTime::parse_from_str(text, format) {
                    return ts;
                }
            }
            DateTime::parse_from_rfc3339(text).unwrap_or_else(|_| unix_epoch())
        }
        _ => unix_epoch(),
    }
}
