//! Time-based revalidation for page payloads that are expensive to rebuild.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

/// Holds one value and hands out clones until it is older than the TTL.
///
/// The lock is held across a refresh, so concurrent callers wait for a single rebuild
/// instead of each querying the database. Failed refreshes leave the slot untouched.
#[derive(Debug)]
pub struct Revalidate<T> {
    ttl: Duration,
    slot: Mutex<Option<Cached<T>>>,
}

impl<T: Clone> Revalidate<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get_or_refresh<F, Fut, E>(&self, refresh: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.value.clone());
            }
        }
        let value = refresh().await?;
        *slot = Some(Cached {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
    }
}
