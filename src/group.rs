//! Group membership index and its optimistic maintenance protocol
//!
//! A group's member set lives in the store as a single entry keyed by the
//! group key. The store offers no multi-key transactions, so the set is
//! maintained with read-modify-conditional-write loops built on the
//! single-key primitives: every mutation re-reads the entry together with
//! its version token and commits through compare-and-swap, restarting
//! whenever a concurrent writer committed first. Each committed write
//! strictly extends the set that was current at read time, so no addition
//! is ever lost; contention only costs retries.
//!
//! Retries are bounded by the configured [`RetryPolicy`] and back off
//! exponentially with jitter. When the budget runs out the operation
//! returns [`Error::Contended`] instead of looping forever.

use crate::config::RetryPolicy;
use crate::driver::VersionToken;
use crate::error::{Error, Result};
use crate::store::ObjectStore;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Maintains the member-key set stored under each group key.
pub struct GroupIndex {
    store: ObjectStore,
    retry: RetryPolicy,
    cas_retries: AtomicU64,
}

impl GroupIndex {
    /// Create an index over the given store facade.
    pub fn new(store: ObjectStore, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            cas_retries: AtomicU64::new(0),
        }
    }

    /// Total retries spent in the optimistic loops since construction.
    pub fn cas_retries(&self) -> u64 {
        self.cas_retries.load(Ordering::Relaxed)
    }

    /// Current member set of the group, or `None` if the group entry is
    /// absent.
    ///
    /// A transport failure here surfaces as [`Error::GroupLookup`]; an
    /// unreachable store is never reported as an empty group.
    pub async fn members(&self, group_key: &str) -> Result<Option<HashSet<String>>> {
        self.store
            .get(group_key)
            .await
            .map_err(|e| lookup_error(group_key, e))
    }

    async fn read_group(&self, group_key: &str) -> Result<Option<(HashSet<String>, VersionToken)>> {
        self.store
            .gets(group_key)
            .await
            .map_err(|e| lookup_error(group_key, e))
    }

    /// Record `member_key` as belonging to the group stored under
    /// `group_key`.
    ///
    /// Idempotent: a member already present commits nothing. Concurrent
    /// callers across processes converge on the union of their additions.
    pub async fn add_member(&self, group_key: &str, member_key: &str) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if self.try_add_once(group_key, member_key).await? {
                return Ok(());
            }

            // Another writer committed between our read and our write.
            self.cas_retries.fetch_add(1, Ordering::Relaxed);
            if attempt > self.retry.max_retries {
                warn!(
                    "Giving up adding '{}' to group '{}' after {} attempts",
                    member_key, group_key, attempt
                );
                return Err(Error::Contended { attempts: attempt });
            }

            let delay = self.retry.backoff_delay(attempt);
            debug!(
                "Contention on group '{}', retrying in {:?} (attempt {})",
                group_key, delay, attempt
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One optimistic pass; `Ok(true)` means committed or already present.
    async fn try_add_once(&self, group_key: &str, member_key: &str) -> Result<bool> {
        match self.read_group(group_key).await? {
            None => {
                let mut members = HashSet::new();
                members.insert(member_key.to_string());

                debug!("Creating group '{}' with first member", group_key);
                self.store.add(group_key, &members).await
            }
            Some((mut members, token)) => {
                if members.contains(member_key) {
                    return Ok(true);
                }

                members.insert(member_key.to_string());
                self.store.cas(group_key, &members, token).await
            }
        }
    }

    /// Delete every member of the group, then the group entry itself.
    ///
    /// Member deletions are best-effort: one failing to delete is logged
    /// and not retried within the pass. If the group entry vanished
    /// between the read and its deletion (a racing call got it first),
    /// the current state is re-read and the pass repeats until the group
    /// reads as absent or its deletion succeeds.
    ///
    /// A member added concurrently with an in-progress pass can survive
    /// with the group entry already gone; such an orphan lives on only
    /// until its own TTL runs out.
    pub async fn remove_group(&self, group_key: &str) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let (members, _token) = match self.read_group(group_key).await? {
                // Already empty.
                None => return Ok(()),
                Some(group) => group,
            };

            debug!(
                "Removing group '{}' with {} members",
                group_key,
                members.len()
            );
            for member in &members {
                match self.store.delete(member).await {
                    Ok(existed) => {
                        if !existed {
                            debug!("Member '{}' already gone", member);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Failed to delete member '{}' of group '{}': {}",
                            member, group_key, e
                        );
                    }
                }
            }

            if self.store.delete(group_key).await? {
                return Ok(());
            }

            // The group entry was deleted out from under us; re-check.
            self.cas_retries.fetch_add(1, Ordering::Relaxed);
            if attempt > self.retry.max_retries {
                warn!(
                    "Giving up removing group '{}' after {} attempts",
                    group_key, attempt
                );
                return Err(Error::Contended { attempts: attempt });
            }

            let delay = self.retry.backoff_delay(attempt);
            debug!(
                "Group '{}' changed during removal, retrying in {:?}",
                group_key, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn lookup_error(group_key: &str, source: Error) -> Error {
    Error::GroupLookup {
        group_key: group_key.to_string(),
        source: Box::new(source),
    }
}
