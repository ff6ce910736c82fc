//! In-process [`StateStore`] backend

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::trace;

use super::{StateStore, StoreError, StoreResult};
use crate::core::clock::{self, Clock, SystemClock};

/// Writes between two eager sweeps of expired entries
const PURGE_EVERY: u64 = 1024;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Sharded in-memory store with lazy expiry.
///
/// Reads drop the expired key they hit. Keys nobody reads again, like past
/// rate windows, are swept every [`PURGE_EVERY`] writes.
///
/// Shared by every task of one process. Multi-process deployments plug a
/// networked backend in behind the same trait.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    writes: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    /// Create a store whose expiry follows `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            writes: Arc::new(AtomicU64::new(0)),
            clock,
        }
    }

    /// Create a store on the system clock
    #[must_use]
    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    /// Whether the store holds no live entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Count a write and sweep on every `PURGE_EVERY`th one.
    ///
    /// Must not be called while holding an entry guard: the sweep locks
    /// every shard.
    fn note_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % PURGE_EVERY == 0 {
            let purged = self.purge_expired();
            trace!(purged, "Swept expired store entries");
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_system_clock()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now();
        let live = self
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.value.clone()));

        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        let expires_at = clock::add(self.clock.now(), ttl);
        self.entries.insert(key.to_string(), Entry { value, expires_at });
        self.note_write();
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: u64, ttl: Duration) -> StoreResult<u64> {
        let now = self.clock.now();
        let fresh = || Entry {
            value: "0".to_string(),
            expires_at: clock::add(now, ttl),
        };

        // The shard lock is held for the whole read-modify-write.
        let next = {
            let mut entry = self.entries.entry(key.to_string()).or_insert_with(fresh);
            if entry.expires_at <= now {
                *entry = fresh();
            }

            let current: u64 = entry.value.parse().map_err(|_| StoreError::Corrupt {
                key: key.to_string(),
                message: format!("'{}' is not a counter", entry.value),
            })?;
            let next = current.saturating_add(delta);
            entry.value = next.to_string();
            next
        };
        self.note_write();
        Ok(next)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
