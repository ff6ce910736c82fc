//! Shared, TTL-based state store
//!
//! Breaker state and rate-limit counters live outside the process so every
//! worker sees the same picture. The store is advisory: callers treat any
//! [`StoreError`] as "no state" and fail open.

mod memory;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use memory::InMemoryStore;

/// Errors raised by a state store backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    /// An entry exists but cannot be decoded
    #[error("corrupt entry at '{key}': {message}")]
    Corrupt {
        /// Offending key
        key: String,
        /// Decoding failure
        message: String,
    },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Key/value store with per-entry expiry.
///
/// Implementations must be safe to share between tasks. `incr_by` should be
/// atomic per key where the backend allows it; nothing else is required to
/// be.
#[async_trait]
pub trait StateStore: Send + Sync + fmt::Debug {
    /// Read a live entry
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write an entry that expires after `ttl`
    async fn set(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()>;

    /// Add `delta` to the counter at `key` and return the new value.
    ///
    /// A missing or expired counter starts from zero and expires after
    /// `ttl`; a live counter keeps its original expiry.
    async fn incr_by(&self, key: &str, delta: u64, ttl: Duration) -> StoreResult<u64>;

    /// Remove an entry
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// Read and decode a JSON entry
pub(crate) async fn get_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Encode and write a JSON entry
pub(crate) async fn set_json<T: Serialize + Sync>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> StoreResult<()> {
    let raw = serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.set(key, raw, ttl).await
}

/// Read a counter, treating a missing entry as zero
pub(crate) async fn get_counter(store: &dyn StateStore, key: &str) -> StoreResult<u64> {
    match store.get(key).await? {
        Some(raw) => raw.parse().map_err(|_| StoreError::Corrupt {
            key: key.to_string(),
            message: format!("'{raw}' is not a counter"),
        }),
        None => Ok(0),
    }
}

/// Key layout. Opaque to callers and not a stable format.
pub(crate) mod keys {
    /// Persisted state of a breaker
    pub(crate) fn breaker(name: &str) -> String {
        format!("circuit_breaker:{name}")
    }

    /// Counter of one rate scope for one subject in one window
    pub(crate) fn rate(scope: &str, subject: &str, window_label: &str) -> String {
        format!("rate_limit:{scope}:{subject}:{window_label}")
    }
}
