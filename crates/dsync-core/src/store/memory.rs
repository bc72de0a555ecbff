// In-memory conditional store
// Every clone shares the same map, so several clients in one process contend
// exactly as they would against a remote store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{Condition, ConditionalStore, StoreError};
use crate::record::{LockRecord, RecordUpdate};

/// Conditional store backed by a `DashMap`
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<String, LockRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lock records stored
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ConditionalStore for MemoryStore {
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn conditional_update(
        &self,
        name: &str,
        condition: &Condition,
        update: &RecordUpdate,
    ) -> Result<LockRecord, StoreError> {
        // The entry guard holds the shard lock for the whole check-and-apply
        match self.records.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                if !condition.evaluate(Some(entry.get())) {
                    return Err(StoreError::ConditionFailed);
                }
                entry.get_mut().apply(update);
                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                if !condition.admits_absent() {
                    return Err(StoreError::ConditionFailed);
                }
                let mut record = LockRecord::new(name);
                record.apply(update);
                entry.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn get(&self, name: &str) -> Result<Option<LockRecord>, StoreError> {
        Ok(self.records.get(name).map(|r| r.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::UNLOCKED;

    #[tokio::test]
    async fn test_acquire_creates_missing_record() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        let record = store
            .conditional_update(
                "job",
                &Condition::acquire(1, None),
                &RecordUpdate::acquire(1, 10),
            )
            .await
            .unwrap();

        assert!(record.is_held_by(1));
        assert_eq!(record.value, None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_condition_failed_leaves_record_untouched() {
        let store = MemoryStore::new();
        store
            .conditional_update(
                "job",
                &Condition::acquire(1, None),
                &RecordUpdate::acquire(1, 10),
            )
            .await
            .unwrap();

        let err = store
            .conditional_update(
                "job",
                &Condition::acquire(2, None),
                &RecordUpdate::acquire(2, 20),
            )
            .await
            .unwrap_err();
        assert!(err.is_condition_failed());

        let record = store.get("job").await.unwrap().unwrap();
        assert!(record.is_held_by(1));
        assert_eq!(record.last_write, Some(10));
    }

    #[tokio::test]
    async fn test_release_persists_value() {
        let store = MemoryStore::new();
        store
            .conditional_update(
                "job",
                &Condition::acquire(1, None),
                &RecordUpdate::acquire(1, 10),
            )
            .await
            .unwrap();
        store
            .conditional_update("job", &Condition::release(1), &RecordUpdate::release(20, "5"))
            .await
            .unwrap();

        let record = store.get("job").await.unwrap().unwrap();
        assert_eq!(record.holder_id, Some(UNLOCKED));
        assert_eq!(record.value.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_vacant_entry_respects_condition() {
        let store = MemoryStore::new();
        let err = store
            .conditional_update(
                "job",
                &Condition::HolderEquals(1),
                &RecordUpdate::acquire(1, 10),
            )
            .await
            .unwrap_err();

        assert!(err.is_condition_failed());
        assert!(store.get("job").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = MemoryStore::new();
        let other = store.clone();

        store
            .conditional_update(
                "job",
                &Condition::acquire(1, None),
                &RecordUpdate::acquire(1, 10),
            )
            .await
            .unwrap();

        assert!(other.get("job").await.unwrap().is_some());
    }
}
