//! Error types for cache operations
//!
//! This module defines the error taxonomy for the groupkv library. The
//! variants deliberately distinguish "the value cannot be stored" from
//! "the store cannot be reached" from "the store is reachable but too
//! contended to make progress", so callers can react to each differently.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum Error {
    /// Value cannot be encoded for storage. Raised before any store I/O
    /// is attempted.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Transport failure - connectivity or protocol issues reported by the
    /// store driver.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transport failure while reading a group's membership entry.
    ///
    /// Kept distinct from [`Error::Transport`] so an unreachable store is
    /// never mistaken for an empty group.
    #[error("Group lookup failed for '{group_key}'")]
    GroupLookup {
        group_key: String,
        source: Box<Error>,
    },

    /// Optimistic retry budget exhausted under sustained contention.
    ///
    /// The operation made no durable progress; it is safe to retry later.
    #[error("Contended: gave up after {attempts} attempts, try again later")]
    Contended { attempts: u32 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Encoding(e.to_string())
    }
}
