//! Public cache operations
//!
//! [`CacheClient`] composes the key codec, the encodability-enforcing
//! store facade, and the group index into the put/get/remove/remove-group
//! surface. Every configuration value is read once at construction; the
//! client is immutable afterwards and safe to share across tasks.

use crate::codec::KeyCodec;
use crate::config::ClientConfig;
use crate::driver::StoreDriver;
use crate::error::Result;
use crate::group::GroupIndex;
use crate::store::ObjectStore;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Health of the backing store as observed by a probe round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Store is reachable and responsive.
    Healthy,
    /// Store is reachable but slow (above the degraded threshold).
    Degraded,
    /// Store is unreachable or erroring.
    Unhealthy,
}

impl HealthStatus {
    /// Check if the store can serve traffic (healthy or degraded).
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// Detailed health check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Overall health status.
    pub status: HealthStatus,
    /// Probe round-trip time in milliseconds.
    pub response_time_ms: u64,
    /// When the probe ran.
    pub timestamp: DateTime<Utc>,
    /// Error message if unhealthy.
    pub error: Option<String>,
}

/// Counters for cache operation outcomes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Reads that found a value.
    pub hits: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Values written.
    pub puts: u64,
    /// Single-entry removals that found a value.
    pub removals: u64,
    /// Whole-group removals completed.
    pub group_removals: u64,
    /// Retries spent in the optimistic group-index loops.
    pub cas_retries: u64,
}

impl CacheStats {
    /// Cache hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, puts: {}, removals: {}, group_removals: {}, cas_retries: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.puts,
            self.removals,
            self.group_removals,
            self.cas_retries
        )
    }
}

#[derive(Default)]
struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    removals: AtomicU64,
    group_removals: AtomicU64,
}

/// Caching client with group-scoped invalidation.
///
/// Entries are written to the backing store individually; each entry is
/// also recorded in its group's membership entry so the whole group can
/// be invalidated in one call. Coordination with other writers happens
/// exclusively through the store's per-key version tokens, never through
/// in-process locks, so any number of client processes can operate on the
/// same store concurrently.
pub struct CacheClient {
    codec: KeyCodec,
    store: ObjectStore,
    groups: GroupIndex,
    driver: Arc<dyn StoreDriver>,
    config: ClientConfig,
    stats: StatCounters,
}

impl CacheClient {
    /// Create a client over the given store driver.
    ///
    /// The configuration is validated and then fixed for the client's
    /// lifetime.
    pub fn new(driver: Arc<dyn StoreDriver>, config: ClientConfig) -> Result<Self> {
        config.validate()?;

        info!(
            "Creating cache client (prefix: '{}', expiration: {}s, servers: {:?})",
            config.key_prefix, config.expiration_secs, config.servers
        );

        let codec = KeyCodec::new(config.key_prefix.clone());
        let store = ObjectStore::new(driver.clone(), config.expiration_secs);
        let groups = GroupIndex::new(store.clone(), config.retry.clone());

        Ok(Self {
            codec,
            store,
            groups,
            driver,
            config,
            stats: StatCounters::default(),
        })
    }

    /// Create a client with the default configuration.
    pub fn with_defaults(driver: Arc<dyn StoreDriver>) -> Result<Self> {
        Self::new(driver, ClientConfig::default())
    }

    /// Store `value` under `key` and record the key in `group`.
    ///
    /// The value is encoded before anything touches the store; a value
    /// that cannot be encoded fails with [`crate::Error::Encoding`] and
    /// performs no I/O. Overwriting an existing key is cheap: if the key
    /// already belongs to the group, the membership update is a no-op.
    pub async fn put<K, V, G>(&self, key: &K, value: &V, group: &G) -> Result<()>
    where
        K: Display + ?Sized,
        V: Serialize,
        G: Display + ?Sized,
    {
        let store_key = self.codec.key(key);
        let group_key = self.codec.group_key(group);
        debug!("Putting '{}' into group '{}'", store_key, group_key);

        self.store.set(&store_key, value).await?;
        self.groups.add_member(&group_key, &store_key).await?;

        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Fetch the value stored under `key`. No side effects.
    pub async fn get<K, V>(&self, key: &K) -> Result<Option<V>>
    where
        K: Display + ?Sized,
        V: DeserializeOwned,
    {
        let store_key = self.codec.key(key);
        let value = self.store.get(&store_key).await?;

        if value.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit: '{}'", store_key);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Cache miss: '{}'", store_key);
        }

        Ok(value)
    }

    /// Remove the entry under `key`, returning the value observed at
    /// fetch time.
    ///
    /// The fetch and the delete are two independent store calls: a value
    /// written by another client in between is deleted along with the
    /// old one and never observed. Callers needing stronger semantics
    /// must coordinate externally.
    pub async fn remove<K, V>(&self, key: &K) -> Result<Option<V>>
    where
        K: Display + ?Sized,
        V: DeserializeOwned,
    {
        let store_key = self.codec.key(key);

        let previous: Option<V> = self.store.get(&store_key).await?;
        if previous.is_some() {
            self.store.delete(&store_key).await?;
            self.stats.removals.fetch_add(1, Ordering::Relaxed);
            debug!("Removed '{}'", store_key);
        }

        Ok(previous)
    }

    /// Invalidate every entry belonging to `group`, then the group's
    /// membership entry itself.
    ///
    /// An entry put into the group while the removal is in flight can
    /// survive the pass (with the membership entry gone) until its own
    /// TTL expires; group removal is convergent, not transactional.
    pub async fn remove_group<G>(&self, group: &G) -> Result<()>
    where
        G: Display + ?Sized,
    {
        let group_key = self.codec.group_key(group);
        info!("Removing group '{}'", group_key);

        self.groups.remove_group(&group_key).await?;
        self.stats.group_removals.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Current member store-keys of `group`, or `None` if the group has
    /// no membership entry.
    ///
    /// A transport failure surfaces as [`crate::Error::GroupLookup`] and
    /// is never reported as an absent group.
    pub async fn group_members<G>(&self, group: &G) -> Result<Option<HashSet<String>>>
    where
        G: Display + ?Sized,
    {
        let group_key = self.codec.group_key(group);
        self.groups.members(&group_key).await
    }

    /// Round-trip a probe entry through the store.
    ///
    /// Returns `Ok(true)` when the store wrote, served, and deleted the
    /// probe.
    pub async fn health_check(&self) -> Result<bool> {
        let probe_key = format!("{}health:{}", self.config.key_prefix, Uuid::new_v4());

        self.driver.set(&probe_key, b"1".to_vec(), 60).await?;
        let observed = self.driver.get(&probe_key).await?;
        self.driver.delete(&probe_key).await?;

        Ok(observed.is_some())
    }

    /// Probe the store and report status with timing.
    ///
    /// Never returns an error; failures come back as an `Unhealthy`
    /// result carrying the error message.
    pub async fn health_check_detailed(&self) -> HealthCheckResult {
        let start = Instant::now();

        match self.health_check().await {
            Ok(round_tripped) => {
                let response_time_ms = start.elapsed().as_millis() as u64;
                let status = if !round_tripped {
                    HealthStatus::Unhealthy
                } else if response_time_ms > self.config.degraded_threshold_ms {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };

                HealthCheckResult {
                    status,
                    response_time_ms,
                    timestamp: Utc::now(),
                    error: if round_tripped {
                        None
                    } else {
                        Some("probe entry did not round-trip".to_string())
                    },
                }
            }
            Err(e) => HealthCheckResult {
                status: HealthStatus::Unhealthy,
                response_time_ms: start.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
                error: Some(e.to_string()),
            },
        }
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            puts: self.stats.puts.load(Ordering::Relaxed),
            removals: self.stats.removals.load(Ordering::Relaxed),
            group_removals: self.stats.group_removals.load(Ordering::Relaxed),
            cas_retries: self.groups.cas_retries(),
        }
    }

    /// The configuration this client was constructed with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Shut the client down, releasing the transport's resources.
    ///
    /// Consumes the client; this is the only teardown path, there is no
    /// drop-time cleanup.
    pub async fn close(self) -> Result<()> {
        info!("Shutting down cache client");
        self.driver.shutdown().await
    }
}
