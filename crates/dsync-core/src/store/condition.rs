//! Conditions over a lock record's current attributes
//!
//! A comparison against an attribute that is not set evaluates to false, so
//! `HolderNotEquals` and `LastWriteBefore` never match a record that has never
//! been locked. Use `Absent`/`HolderAbsent` to admit those explicitly.

use crate::record::{LockRecord, UNLOCKED};

/// Predicate checked atomically by a [`ConditionalStore`](super::ConditionalStore)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The record does not exist
    Absent,
    /// The record exists but has no holder attribute
    HolderAbsent,
    /// Holder id equals the value
    HolderEquals(i64),
    /// Holder id is set and differs from the value
    HolderNotEquals(i64),
    /// Last write is set and strictly older than the nanosecond timestamp
    LastWriteBefore(i64),
    Or(Vec<Condition>),
    And(Vec<Condition>),
}

impl Condition {
    /// Condition under which `session_id` may take the lock.
    ///
    /// Admits a missing record, a record without holder, an unlocked record and
    /// a record already held by the same session. When `stale_before` is set, a
    /// record held by another session whose last write is older than it is
    /// admitted as well.
    pub fn acquire(session_id: i64, stale_before: Option<i64>) -> Self {
        let mut any = vec![
            Condition::Absent,
            Condition::HolderAbsent,
            Condition::HolderEquals(UNLOCKED),
            Condition::HolderEquals(session_id),
        ];
        if let Some(stale_before) = stale_before {
            any.push(Condition::And(vec![
                Condition::HolderNotEquals(session_id),
                Condition::LastWriteBefore(stale_before),
            ]));
        }
        Condition::Or(any)
    }

    /// Condition under which `session_id` may release the lock
    pub fn release(session_id: i64) -> Self {
        Condition::Or(vec![
            Condition::Absent,
            Condition::HolderEquals(session_id),
        ])
    }

    /// Evaluate against the current record, `None` meaning it does not exist
    pub fn evaluate(&self, record: Option<&LockRecord>) -> bool {
        match self {
            Condition::Absent => record.is_none(),
            Condition::HolderAbsent => record.is_some_and(|r| r.holder_id.is_none()),
            Condition::HolderEquals(id) => record.is_some_and(|r| r.holder_id == Some(*id)),
            Condition::HolderNotEquals(id) => {
                record.is_some_and(|r| r.holder_id.is_some_and(|h| h != *id))
            }
            Condition::LastWriteBefore(ts) => {
                record.is_some_and(|r| r.last_write.is_some_and(|w| w < *ts))
            }
            Condition::Or(any) => any.iter().any(|c| c.evaluate(record)),
            Condition::And(all) => all.iter().all(|c| c.evaluate(record)),
        }
    }

    /// Whether the condition holds for a record that does not exist yet
    pub fn admits_absent(&self) -> bool {
        self.evaluate(None)
    }
}
