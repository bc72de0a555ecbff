//! Distributed mutex client
//!
//! A [`Mutex`] takes a named lock in a [`ConditionalStore`] and carries a small
//! value from one holder to the next. Every client instance owns a random,
//! nonzero session id; the store record's holder id says which session (if
//! any) owns the lock.
//!
//! `lock` retries on contention with a short randomized backoff until the
//! timeout elapses. With an expiry configured, a lock whose last write is
//! older than the expiry is considered abandoned and may be seized by another
//! session. `unlock` writes the cached value back and clears the holder.
//!
//! Methods take `&mut self`: one client is used by one task at a time.
//! Concurrency comes from separate clients, typically in separate processes.

use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::config::MutexConfig;
use crate::error::{LockError, Result};
use crate::metrics;
use crate::record::{RecordUpdate, now_nanos};
use crate::store::{Condition, ConditionalStore, SqlStore, StoreError};

/// Ownership state as last observed by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexState {
    /// This client does not hold the lock
    Unlocked,
    /// The last acquisition by this client succeeded and was not released
    HeldBySelf,
}

/// Named distributed lock with a shared value
pub struct Mutex {
    name: String,
    session_id: i64,
    expiry: Duration,
    timeout: Duration,
    value: String,
    state: MutexState,
    store: Arc<dyn ConditionalStore>,
    backoff: Backoff,
}

impl std::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex")
            .field("name", &self.name)
            .field("session_id", &self.session_id)
            .field("expiry", &self.expiry)
            .field("timeout", &self.timeout)
            .field("value", &self.value)
            .field("state", &self.state)
            .finish()
    }
}

impl Mutex {
    pub fn builder() -> MutexBuilder {
        MutexBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// How long `lock` retries before failing; zero means forever
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn state(&self) -> MutexState {
        self.state
    }

    pub fn is_held(&self) -> bool {
        self.state == MutexState::HeldBySelf
    }

    /// Shared handle to the backing store, for building more clients on the
    /// same connection
    pub fn store(&self) -> Arc<dyn ConditionalStore> {
        self.store.clone()
    }

    /// Replace the acquisition timeout. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        warn_if_unbounded(&self.name, timeout, self.expiry);
        self
    }

    /// Acquire the lock, waiting while another session holds it.
    ///
    /// On success the value stored with the lock replaces the cached value.
    /// Fails with [`LockError::FailedToAcquire`] once the timeout has elapsed
    /// under contention. Store failures are returned immediately.
    pub async fn lock(&mut self) -> Result<()> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.acquire_once().await {
                Ok(()) => {
                    let waited = started.elapsed();
                    debug!(
                        name = %self.name,
                        session_id = self.session_id,
                        attempts,
                        waited_ms = waited.as_millis() as u64,
                        "Lock acquired"
                    );
                    metrics::record_acquired(&self.name, waited);
                    return Ok(());
                }
                Err(StoreError::ConditionFailed) => {
                    metrics::record_contended(&self.name);

                    if !self.timeout.is_zero() && started.elapsed() >= self.timeout {
                        warn!(
                            name = %self.name,
                            session_id = self.session_id,
                            attempts,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "Lock acquisition timed out"
                        );
                        metrics::record_timeout(&self.name);
                        return Err(LockError::FailedToAcquire {
                            name: self.name.clone(),
                            timeout: self.timeout,
                        });
                    }

                    tokio::time::sleep(self.backoff.next_delay()).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Make a single acquisition attempt.
    ///
    /// Returns `Ok(false)` when another session holds the lock.
    pub async fn try_lock(&mut self) -> Result<bool> {
        match self.acquire_once().await {
            Ok(()) => Ok(true),
            Err(StoreError::ConditionFailed) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Release the lock and store the cached value with it.
    ///
    /// Fails with [`LockError::NotHolder`] when this client has not acquired
    /// the lock, or when another session owns it, including after it was
    /// seized because this client let it expire.
    pub async fn unlock(&mut self) -> Result<()> {
        // Only a successful acquisition can make this session the holder
        if self.state != MutexState::HeldBySelf {
            return Err(LockError::NotHolder(self.name.clone()));
        }

        let update = RecordUpdate::release(now_nanos(), self.value.clone());
        let condition = Condition::release(self.session_id);

        match self
            .store
            .conditional_update(&self.name, &condition, &update)
            .await
        {
            Ok(_) => {
                self.state = MutexState::Unlocked;
                debug!(name = %self.name, session_id = self.session_id, "Lock released");
                metrics::record_released(&self.name);
                Ok(())
            }
            Err(StoreError::ConditionFailed) => {
                self.state = MutexState::Unlocked;
                Err(LockError::NotHolder(self.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Lock and return the current value
    pub async fn lock_and_get_value(&mut self) -> Result<String> {
        self.lock().await?;
        Ok(self.value.clone())
    }

    /// Replace the value and unlock
    pub async fn set_value_and_unlock(&mut self, value: impl Into<String>) -> Result<()> {
        self.set_value(value);
        self.unlock().await
    }

    /// Cached value. Only meaningful while the lock is held.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Replace the cached value; it is written to the store by `unlock`
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    /// Cached value parsed as a signed integer; empty reads as `0`
    pub fn value_i64(&self) -> Result<i64> {
        parse_value(&self.value)
    }

    pub fn set_value_i64(&mut self, value: i64) {
        self.value = value.to_string();
    }

    /// Cached value parsed as an unsigned integer; empty reads as `0`
    pub fn value_u64(&self) -> Result<u64> {
        parse_value(&self.value)
    }

    pub fn set_value_u64(&mut self, value: u64) {
        self.value = value.to_string();
    }

    async fn acquire_once(&mut self) -> std::result::Result<(), StoreError> {
        let now = now_nanos();
        let condition = Condition::acquire(self.session_id, self.stale_before(now));
        let update = RecordUpdate::acquire(self.session_id, now);

        let record = self
            .store
            .conditional_update(&self.name, &condition, &update)
            .await?;

        // A record that never went through unlock has no value yet
        if let Some(value) = record.value {
            self.value = value;
        }
        self.state = MutexState::HeldBySelf;
        Ok(())
    }

    fn stale_before(&self, now: i64) -> Option<i64> {
        if self.expiry.is_zero() {
            return None;
        }
        let expiry = i64::try_from(self.expiry.as_nanos()).unwrap_or(i64::MAX);
        Some(now.saturating_sub(expiry))
    }
}

fn parse_value<T>(value: &str) -> Result<T>
where
    T: FromStr<Err = ParseIntError> + Default,
{
    if value.is_empty() {
        return Ok(T::default());
    }
    value.parse().map_err(|source| LockError::InvalidValue {
        value: value.to_string(),
        source,
    })
}

fn warn_if_unbounded(name: &str, timeout: Duration, expiry: Duration) {
    if timeout.is_zero() && expiry.is_zero() {
        warn!(
            name = %name,
            "Lock has neither timeout nor expiry; lock() may block forever if a holder never unlocks"
        );
    }
}

/// Builds a fully initialized [`Mutex`]
#[derive(Default)]
pub struct MutexBuilder {
    config: MutexConfig,
    expiry: Option<Duration>,
    timeout: Option<Duration>,
    store: Option<Arc<dyn ConditionalStore>>,
    rng: Option<StdRng>,
}

impl MutexBuilder {
    /// Start from a loaded configuration
    pub fn from_config(config: MutexConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.config.table = table.into();
        self
    }

    pub fn store_url(mut self, url: impl Into<String>) -> Self {
        self.config.store_url = Some(url.into());
        self
    }

    /// Use `DATABASE_URL` only if this is false (the default)
    pub fn ignore_env_vars(mut self, ignore: bool) -> Self {
        self.config.ignore_env_vars = ignore;
        self
    }

    pub fn initial_value(mut self, value: impl Into<String>) -> Self {
        self.config.initial_value = value.into();
        self
    }

    /// Age after which another session may seize an unreleased lock
    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Acquisition timeout; zero disables it
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use an existing store instead of connecting to `store_url`
    pub fn store(mut self, store: Arc<dyn ConditionalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Random source for the session id and backoff jitter
    pub fn rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Connect, provision the lock table and assign a session id
    pub async fn build(self) -> Result<Mutex> {
        let config = self.config.normalized();
        let expiry = self.expiry.unwrap_or_else(|| config.expiry());
        let timeout = self.timeout.unwrap_or_else(|| config.timeout());

        let store: Arc<dyn ConditionalStore> = match self.store {
            Some(store) => store,
            None => Arc::new(SqlStore::connect(&config.resolve_store_url(), &config.table).await?),
        };
        store.ensure_ready().await?;

        let mut rng = self.rng.unwrap_or_else(StdRng::from_os_rng);
        let session_id = rng.random_range(1..=i64::MAX);
        let backoff = Backoff::new(StdRng::from_rng(&mut rng));

        warn_if_unbounded(&config.name, timeout, expiry);
        debug!(name = %config.name, session_id, "Mutex client initialized");

        Ok(Mutex {
            name: config.name,
            session_id,
            expiry,
            timeout,
            value: config.initial_value,
            state: MutexState::Unlocked,
            store,
            backoff,
        })
    }
}
