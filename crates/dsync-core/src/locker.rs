//! Locker trait

use async_trait::async_trait;

use crate::error::Result;
use crate::mutex::Mutex;

/// A lock carrying a value from one holder to the next.
///
/// Implemented by [`Mutex`]; code that only needs the lock protocol can take
/// `&mut dyn Locker` and be exercised with an in-process implementation.
#[async_trait]
pub trait Locker: Send {
    /// Block until the lock is held or the timeout elapses
    async fn lock(&mut self) -> Result<()>;

    /// Release the lock, persisting the cached value
    async fn unlock(&mut self) -> Result<()>;

    fn value(&self) -> &str;
    fn set_value(&mut self, value: String);

    fn value_i64(&self) -> Result<i64>;
    fn set_value_i64(&mut self, value: i64);

    fn value_u64(&self) -> Result<u64>;
    fn set_value_u64(&mut self, value: u64);

    /// Lock and return the current value
    async fn lock_and_get_value(&mut self) -> Result<String> {
        self.lock().await?;
        Ok(self.value().to_string())
    }

    /// Replace the value and unlock
    async fn set_value_and_unlock(&mut self, value: String) -> Result<()> {
        self.set_value(value);
        self.unlock().await
    }
}

#[async_trait]
impl Locker for Mutex {
    async fn lock(&mut self) -> Result<()> {
        Mutex::lock(self).await
    }

    async fn unlock(&mut self) -> Result<()> {
        Mutex::unlock(self).await
    }

    fn value(&self) -> &str {
        Mutex::value(self)
    }

    fn set_value(&mut self, value: String) {
        Mutex::set_value(self, value)
    }

    fn value_i64(&self) -> Result<i64> {
        Mutex::value_i64(self)
    }

    fn set_value_i64(&mut self, value: i64) {
        Mutex::set_value_i64(self, value)
    }

    fn value_u64(&self) -> Result<u64> {
        Mutex::value_u64(self)
    }

    fn set_value_u64(&mut self, value: u64) {
        Mutex::set_value_u64(self, value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryStore;

    async fn increment(locker: &mut dyn Locker) -> Result<i64> {
        locker.lock().await?;
        let next = locker.value_i64()? + 1;
        locker.set_value_i64(next);
        locker.unlock().await?;
        Ok(next)
    }

    #[tokio::test]
    async fn test_mutex_through_trait_object() {
        let store = Arc::new(MemoryStore::new());
        let mut mutex = Mutex::builder().store(store).build().await.unwrap();

        assert_eq!(increment(&mut mutex).await.unwrap(), 1);
        assert_eq!(increment(&mut mutex).await.unwrap(), 2);

        let locker: &mut dyn Locker = &mut mutex;
        assert_eq!(locker.lock_and_get_value().await.unwrap(), "2");
        locker.set_value_and_unlock("done".to_string()).await.unwrap();
        assert_eq!(mutex.value(), "done");
    }
}
