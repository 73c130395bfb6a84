//! Key/value cache with per-entry expiry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

use crate::MapperResult;

/// Cache store seam. Keys are namespaced by purpose (`client.<mac>`,
/// `networks`).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value for `key` if present and not expired.
    async fn get(&self, key: &str) -> MapperResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value and expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> MapperResult<()>;

    /// Whether `key` holds a live value.
    async fn exists(&self, key: &str) -> MapperResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Minimum time between expiry sweeps triggered by writes.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// In-process [`CacheStore`].
///
/// Expired entries vanish on read, and writes sweep the whole map at most
/// once per [`SWEEP_INTERVAL`].
#[derive(Debug)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    next_sweep: Mutex<Instant>,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self {
            entries: RwLock::default(),
            next_sweep: Mutex::new(Instant::now() + SWEEP_INTERVAL),
        }
    }
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, e| e.expires_at > now);
        *self.next_sweep.lock() = now + SWEEP_INTERVAL;
    }

    fn sweep_due(&self, now: Instant) -> bool {
        let mut next = self.next_sweep.lock();
        if now < *next {
            return false;
        }
        *next = now + SWEEP_INTERVAL;
        true
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> MapperResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.entries.write().remove(key);
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> MapperResult<()> {
        let now = Instant::now();
        let sweep = self.sweep_due(now);
        let mut entries = self.entries.write();
        if sweep {
            let before = entries.len();
            entries.retain(|_, e| e.expires_at > now);
            if entries.len() < before {
                debug!(evicted = before - entries.len(), "Swept expired cache entries");
            }
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
