//! In-memory store driver
//!
//! A process-local implementation of the full [`StoreDriver`] contract,
//! used by the test suite and by callers that want the group-invalidation
//! semantics without a running store. Single-key atomicity matches the
//! real protocol: `add` fails against a live entry, `cas` compares the
//! entry's current version against the presented token, and expired
//! entries are treated as absent on every read.
//!
//! One contract nuance does not apply here: every nonzero `ttl_secs` is
//! relative seconds-from-now, with no absolute-epoch threshold.

use crate::driver::{StoreDriver, VersionToken};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// A stored entry with its version and optional expiry.
struct StoredEntry {
    value: Vec<u8>,
    version: u64,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if Instant::now() >= at)
    }
}

/// In-memory implementation of the store protocol.
pub struct MemoryDriver {
    entries: RwLock<HashMap<String, StoredEntry>>,
    version_counter: AtomicU64,
    closed: AtomicBool,
}

impl MemoryDriver {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            version_counter: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of live (unexpired) entries currently stored.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }

    /// Whether the store holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn next_version(&self) -> u64 {
        self.version_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Transport("store driver is shut down".to_string()));
        }
        Ok(())
    }

    fn expiry_for(ttl_secs: u64) -> Option<Instant> {
        if ttl_secs == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_secs(ttl_secs))
        }
    }

    /// Drop the entry under `key` if its TTL has elapsed.
    fn purge_if_expired(entries: &mut HashMap<String, StoredEntry>, key: &str) {
        if entries.get(key).map(|e| e.is_expired()).unwrap_or(false) {
            entries.remove(key);
        }
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreDriver for MemoryDriver {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        let mut entries = self.entries.write().await;
        Self::purge_if_expired(&mut entries, key);
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn gets(&self, key: &str) -> Result<Option<(Vec<u8>, VersionToken)>> {
        self.ensure_open()?;
        let mut entries = self.entries.write().await;
        Self::purge_if_expired(&mut entries, key);
        Ok(entries
            .get(key)
            .map(|e| (e.value.clone(), VersionToken::new(e.version))))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        self.ensure_open()?;
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                version: self.next_version(),
                expires_at: Self::expiry_for(ttl_secs),
            },
        );
        Ok(())
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<bool> {
        self.ensure_open()?;
        let mut entries = self.entries.write().await;
        Self::purge_if_expired(&mut entries, key);

        if entries.contains_key(key) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                version: self.next_version(),
                expires_at: Self::expiry_for(ttl_secs),
            },
        );
        Ok(true)
    }

    async fn cas(&self, key: &str, value: Vec<u8>, token: VersionToken) -> Result<bool> {
        self.ensure_open()?;
        let mut entries = self.entries.write().await;
        Self::purge_if_expired(&mut entries, key);

        match entries.get_mut(key) {
            Some(entry) if entry.version == token.raw() => {
                entry.value = value;
                entry.version = self.next_version();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let mut entries = self.entries.write().await;
        Self::purge_if_expired(&mut entries, key);
        Ok(entries.remove(key).is_some())
    }

    async fn shutdown(&self) -> Result<()> {
        debug!("Shutting down in-memory store driver");
        self.closed.store(true, Ordering::SeqCst);
        let mut entries = self.entries.write().await;
        entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let driver = MemoryDriver::new();

        driver.set("k", b"v".to_vec(), 0).await.unwrap();
        assert_eq!(driver.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(driver.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_only_creates() {
        let driver = MemoryDriver::new();

        assert!(driver.add("k", b"first".to_vec(), 0).await.unwrap());
        assert!(!driver.add("k", b"second".to_vec(), 0).await.unwrap());
        assert_eq!(driver.get("k").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_token() {
        let driver = MemoryDriver::new();

        driver.set("k", b"v1".to_vec(), 0).await.unwrap();
        let (_, token) = driver.gets("k").await.unwrap().unwrap();

        // A concurrent writer bumps the version.
        driver.set("k", b"v2".to_vec(), 0).await.unwrap();

        assert!(!driver.cas("k", b"v3".to_vec(), token).await.unwrap());
        assert_eq!(driver.get("k").await.unwrap(), Some(b"v2".to_vec()));

        let (_, fresh) = driver.gets("k").await.unwrap().unwrap();
        assert!(driver.cas("k", b"v3".to_vec(), fresh).await.unwrap());
        assert_eq!(driver.get("k").await.unwrap(), Some(b"v3".to_vec()));
    }

    #[tokio::test]
    async fn test_cas_on_absent_key_fails() {
        let driver = MemoryDriver::new();

        let stale = VersionToken::new(7);
        assert!(!driver.cas("missing", b"v".to_vec(), stale).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let driver = MemoryDriver::new();

        driver.set("k", b"v".to_vec(), 0).await.unwrap();
        assert!(driver.delete("k").await.unwrap());
        assert!(!driver.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let driver = MemoryDriver::new();

        driver.set("k", b"v".to_vec(), 1).await.unwrap();
        assert!(driver.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(driver.get("k").await.unwrap().is_none());
        // The slot is free again for add.
        assert!(driver.add("k", b"v2".to_vec(), 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_operations() {
        let driver = MemoryDriver::new();

        driver.set("k", b"v".to_vec(), 0).await.unwrap();
        driver.shutdown().await.unwrap();

        let err = driver.get("k").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_versions_increase() {
        let driver = MemoryDriver::new();

        driver.set("k", b"v1".to_vec(), 0).await.unwrap();
        let (_, t1) = driver.gets("k").await.unwrap().unwrap();

        driver.set("k", b"v2".to_vec(), 0).await.unwrap();
        let (_, t2) = driver.gets("k").await.unwrap().unwrap();

        assert!(t2.raw() > t1.raw());
    }
}
