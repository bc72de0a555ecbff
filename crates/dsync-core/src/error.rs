//! Client-facing error types

use std::num::ParseIntError;
use std::time::Duration;

use crate::store::StoreError;

/// Error type for mutex operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not lock '{name}' within {timeout:?}")]
    FailedToAcquire { name: String, timeout: Duration },

    #[error("could not unlock '{0}': not held by this session")]
    NotHolder(String),

    #[error("invalid value '{value}': {source}")]
    InvalidValue {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, LockError>;
