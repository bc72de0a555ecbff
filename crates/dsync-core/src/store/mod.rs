//! Conditional store abstraction
//!
//! This module provides:
//! - The [`ConditionalStore`] trait the mutex client drives
//! - The [`Condition`] predicate language evaluated by every backend
//! - An in-memory backend ([`MemoryStore`])
//! - A relational backend built on sea-orm ([`SqlStore`])

mod condition;
mod memory;
mod sql;

use async_trait::async_trait;

use crate::record::{LockRecord, RecordUpdate};

pub use condition::Condition;
pub use memory::MemoryStore;
pub use sql::{DEFAULT_TABLE, SqlStore};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The condition evaluated false; nothing was written
    #[error("condition check failed")]
    ConditionFailed,

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("table '{table}' not ready: {reason}")]
    NotReady { table: String, reason: String },

    #[error("invalid table name '{0}'")]
    InvalidTable(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Whether this is the contention signal rather than a real failure
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, StoreError::ConditionFailed)
    }
}

/// Backing store offering per-key atomic conditional writes
#[async_trait]
pub trait ConditionalStore: Send + Sync {
    /// Make sure the backing table exists and answers requests.
    ///
    /// Must be idempotent and must tolerate another process creating the
    /// table concurrently.
    async fn ensure_ready(&self) -> Result<(), StoreError>;

    /// Apply `update` to the record `name` if and only if `condition` holds.
    ///
    /// The check and the write are atomic with respect to every other update
    /// of the same key. Returns the record as written, or
    /// [`StoreError::ConditionFailed`] when the condition was false.
    async fn conditional_update(
        &self,
        name: &str,
        condition: &Condition,
        update: &RecordUpdate,
    ) -> Result<LockRecord, StoreError>;

    /// Read the record without taking part in the protocol
    async fn get(&self, name: &str) -> Result<Option<LockRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            StoreError::ConditionFailed.to_string(),
            "condition check failed"
        );

        let err = StoreError::NotReady {
            table: "locks".to_string(),
            reason: "timed out".to_string(),
        };
        assert_eq!(err.to_string(), "table 'locks' not ready: timed out");

        let err = StoreError::InvalidTable("locks; drop".to_string());
        assert_eq!(err.to_string(), "invalid table name 'locks; drop'");
    }

    #[test]
    fn test_condition_failed_classification() {
        assert!(StoreError::ConditionFailed.is_condition_failed());
        assert!(!StoreError::InvalidTable("x".to_string()).is_condition_failed());

        let err: StoreError = anyhow::anyhow!("connection reset").into();
        assert!(!err.is_condition_failed());
        assert_eq!(err.to_string(), "connection reset");
    }
}
