//! The store protocol contract
//!
//! A [`StoreDriver`] exposes the key-value store's single-key atomic
//! primitives: plain reads, versioned reads, unconditional writes,
//! add-if-absent, compare-and-swap, and deletes. Everything above this
//! trait is built exclusively from these primitives; the wire protocol,
//! connection pooling, socket timeouts, and failover belong to the
//! transport implementing it.
//!
//! ## TTL convention
//!
//! `ttl_secs` of [`TTL_NEVER`] (zero) means the entry never expires; any
//! other value is seconds-to-live from the call. Values are passed to the
//! store unchanged. Some store protocols interpret values above an
//! internal threshold (commonly 30 days) as absolute epoch seconds rather
//! than a relative offset; that interpretation belongs to the store and
//! this client does not translate for it.
//!
//! ## Shutdown
//!
//! Transports own process-wide resources (connection pools). They are
//! acquired when the driver is constructed and released by an explicit
//! [`StoreDriver::shutdown`] call, never by drop-time finalization.

pub mod memory;

use crate::error::Result;
use async_trait::async_trait;

/// Entry time-to-live meaning "never expires", per store convention.
pub const TTL_NEVER: u64 = 0;

/// Opaque version token returned by a versioned read and required by a
/// conditional write.
///
/// The store hands one out on [`StoreDriver::gets`] and rejects a
/// [`StoreDriver::cas`] presenting a token older than the entry's current
/// version. Tokens are only meaningful to the store that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionToken(u64);

impl VersionToken {
    /// Wrap a raw store-issued version value. For driver implementations.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw version value, for handing back to the store.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Single-key atomic primitives of the external key-value store.
///
/// All operations are synchronous from the caller's point of view: each
/// call is one blocking round trip with no client-side deadline. Timeouts
/// and cancellation are the transport's responsibility.
#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Fetch the value stored under `key` along with its version token.
    async fn gets(&self, key: &str) -> Result<Option<(Vec<u8>, VersionToken)>>;

    /// Unconditionally store `value` under `key`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;

    /// Store `value` under `key` only if no entry exists.
    ///
    /// Returns `true` if this call created the entry, `false` if an entry
    /// was already present.
    async fn add(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<bool>;

    /// Store `value` under `key` only if the entry's version still matches
    /// `token`.
    ///
    /// Returns `true` if the write was applied, `false` if the token was
    /// stale or the entry is gone. The entry's expiration is left as the
    /// store last set it.
    async fn cas(&self, key: &str, value: Vec<u8>, token: VersionToken) -> Result<bool>;

    /// Delete the entry under `key`. Returns `true` if an entry existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Release every resource the transport owns. Operations after
    /// shutdown fail with a transport error.
    async fn shutdown(&self) -> Result<()>;
}
