//! # groupkv
//!
//! A caching client that layers *group-scoped invalidation* on top of a
//! distributed key-value store whose native protocol only offers
//! single-key atomic primitives (get, versioned get, set, add-if-absent,
//! compare-and-swap, delete).
//!
//! The store has no concept of namespaces, so deleting "every entry in
//! group g" is not a store operation. This crate maintains a per-group
//! membership entry - the set of store keys currently belonging to the
//! group - and keeps it correct under arbitrarily many concurrent writers
//! across processes using nothing but version-token compare-and-swap.
//! Group invalidation then reads the membership entry and deletes each
//! member.
//!
//! ## Features
//!
//! - Deterministic key fingerprinting: arbitrary application keys map to
//!   fixed-length store keys shared by every client process
//! - Optimistic, lock-free group membership maintenance with bounded
//!   retries and exponential backoff
//! - Typed values over JSON encoding, with the encodability check made
//!   before any store I/O
//! - Distinct error for "group unreachable" vs "group absent"
//! - Operation counters and a store health probe
//! - An in-memory [`StoreDriver`] implementation for tests and local
//!   development
//!
//! ## Example
//!
//! ```rust
//! use groupkv::{CacheClient, MemoryDriver};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CacheClient::with_defaults(Arc::new(MemoryDriver::new()))?;
//!
//!     client.put("report:2024", &"contents", "reports").await?;
//!     client.put("report:2025", &"more contents", "reports").await?;
//!
//!     let cached: Option<String> = client.get("report:2024").await?;
//!     assert_eq!(cached.as_deref(), Some("contents"));
//!
//!     // Invalidate every entry in the group at once.
//!     client.remove_group("reports").await?;
//!     let gone: Option<String> = client.get("report:2024").await?;
//!     assert!(gone.is_none());
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Custom configuration
//!
//! ```rust
//! use groupkv::{CacheClient, ClientConfig, MemoryDriver, RetryPolicy};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = ClientConfig::builder()
//!     .key_prefix("app:")
//!     .expiration_secs(3600)
//!     .retry(RetryPolicy {
//!         max_retries: 8,
//!         base_delay: Duration::from_millis(2),
//!         max_delay: Duration::from_millis(200),
//!         jitter: 0.25,
//!     })
//!     .build();
//!
//! let client = CacheClient::new(Arc::new(MemoryDriver::new()), config)?;
//! client.put("k", &42u32, "g").await?;
//! # client.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Consistency model
//!
//! Additions to a group converge: every committed write strictly extends
//! the member set that was current at its read, so concurrent `put`s
//! never lose each other's membership records. Group removal is
//! convergent but not transactional - an entry put into a group while
//! that group is being removed can outlive the removal until its own TTL
//! expires. Single-entry `remove` fetches and then deletes in two steps;
//! a write landing between the two is lost. These windows are properties
//! of a store without multi-key transactions, documented on the
//! respective operations.

pub mod client;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod group;
pub mod store;

// Re-export main types for convenience
pub use client::{CacheClient, CacheStats, HealthCheckResult, HealthStatus};
pub use codec::KeyCodec;
pub use config::{ClientConfig, ClientConfigBuilder, PoolConfig, RetryPolicy};
pub use driver::memory::MemoryDriver;
pub use driver::{StoreDriver, VersionToken, TTL_NEVER};
pub use error::{Error, Result};
pub use group::GroupIndex;
pub use store::ObjectStore;
