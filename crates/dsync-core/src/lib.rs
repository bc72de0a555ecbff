//! dsync - distributed mutex over a conditional-write store
//!
//! This crate provides:
//! - A named distributed lock with optional expiry and acquisition timeout
//! - A small value handed from each holder to the next
//! - Conditional-write stores: in-memory and relational (sea-orm)
//! - Configuration loading from files and `DSYNC_*` environment variables

pub mod backoff;
pub mod config;
pub mod error;
pub mod locker;
pub mod metrics;
pub mod mutex;
pub mod record;
pub mod store;

pub use config::MutexConfig;
pub use error::{LockError, Result};
pub use locker::Locker;
pub use mutex::{Mutex, MutexBuilder, MutexState};
pub use record::{LockRecord, RecordUpdate, UNLOCKED};
pub use store::{Condition, ConditionalStore, MemoryStore, SqlStore, StoreError};
