//! Time-bounded metadata cache owned by the tracker client.
//!
//! Holds lookups that rarely change (issue types of the project, transitions
//! available on an issue) so each pass does not refetch them. Entries expire
//! after the configured TTL and can be invalidated explicitly.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// A keyed cache whose entries live for at most `ttl`.
#[derive(Debug)]
pub struct MetadataCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> MetadataCache<V> {
    /// Creates an empty cache.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the live entry for `key`, if any.
    pub async fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now()).await
    }

    async fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| now.saturating_duration_since(entry.stored_at) < self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub async fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_at(key.into(), value, Instant::now()).await;
    }

    /// Stale entries are swept on every insert.
    async fn insert_at(&self, key: String, value: V, stored_at: Instant) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| stored_at.saturating_duration_since(entry.stored_at) < self.ttl);
        entries.insert(key, Entry { value, stored_at });
    }

    /// Drops the entry for `key`.
    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Returns the live entry for `key`, loading and storing it on a miss.
    ///
    /// A failed load stores nothing.
    pub async fn get_or_try_load<F, Fut, E>(&self, key: &str, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }
        let value = load().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }
}
