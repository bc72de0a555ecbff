//! Lock record data model
//!
//! One record per lock name. Attributes are optional because a record may exist
//! without ever having been locked, and a record that does not exist at all is
//! treated the same as an unlocked one.

use serde::{Deserialize, Serialize};

/// Holder id sentinel meaning "unlocked"
pub const UNLOCKED: i64 = 0;

/// Persisted state of one named lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LockRecord {
    /// Lock name (partition key)
    pub name: String,
    /// Session id of the current holder, `0` when unlocked
    #[serde(rename = "HolderID", default)]
    pub holder_id: Option<i64>,
    /// Nanosecond timestamp of the last successful conditional write
    #[serde(default)]
    pub last_write: Option<i64>,
    /// Opaque payload handed from holder to holder
    #[serde(default)]
    pub value: Option<String>,
}

impl LockRecord {
    /// Create an empty record with no attributes besides its name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            holder_id: None,
            last_write: None,
            value: None,
        }
    }

    /// Check whether no session currently holds this record
    pub fn is_unlocked(&self) -> bool {
        self.holder_id.unwrap_or(UNLOCKED) == UNLOCKED
    }

    /// Check whether the given session holds this record
    pub fn is_held_by(&self, session_id: i64) -> bool {
        session_id != UNLOCKED && self.holder_id == Some(session_id)
    }

    /// Apply an update in place
    pub fn apply(&mut self, update: &RecordUpdate) {
        self.holder_id = Some(update.holder_id);
        self.last_write = Some(update.last_write);
        if let Some(value) = &update.value {
            self.value = Some(value.clone());
        }
    }
}

/// New attribute values written by a successful conditional update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    pub holder_id: i64,
    pub last_write: i64,
    /// `None` leaves the stored value untouched
    pub value: Option<String>,
}

impl RecordUpdate {
    /// Update taking ownership for `session_id`
    pub fn acquire(session_id: i64, now: i64) -> Self {
        Self {
            holder_id: session_id,
            last_write: now,
            value: None,
        }
    }

    /// Update releasing ownership and persisting `value`
    pub fn release(now: i64, value: impl Into<String>) -> Self {
        Self {
            holder_id: UNLOCKED,
            last_write: now,
            value: Some(value.into()),
        }
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch
pub fn now_nanos() -> i64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or(i64::MAX)
}
