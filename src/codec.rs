//! Deterministic store-key derivation
//!
//! Application keys of arbitrary shape are mapped to fixed-length store
//! keys: a configured namespace prefix followed by the hex SHA-256 digest
//! of the key's string form. Equal keys always map to the same store key
//! with no per-instance salt, so independent client processes agree on
//! key identity. The digest also keeps every derived key within the
//! store's key-length limit regardless of how long the application key is.

use sha2::{Digest, Sha256};
use std::fmt::Display;

/// Length in characters of the hex-encoded digest portion of a store key.
pub const FINGERPRINT_LEN: usize = 64;

/// Maps application keys and group identifiers to store keys.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    prefix: String,
}

impl KeyCodec {
    /// Create a codec with the given namespace prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Derive the store key for an application key.
    ///
    /// The key's `Display` form is digested, so any two logically equal
    /// keys with the same string form produce identical store keys.
    pub fn key<K: Display + ?Sized>(&self, raw: &K) -> String {
        let digest = Sha256::digest(raw.to_string().as_bytes());
        format!("{}{}", self.prefix, hex::encode(digest))
    }

    /// Derive the store key under which a group's member set is indexed.
    ///
    /// Group identifiers share the application key space: the identifier
    /// goes through the same digest as any other key.
    pub fn group_key<G: Display + ?Sized>(&self, group_id: &G) -> String {
        self.key(group_id)
    }

    /// The namespace prefix this codec was built with.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Maximum length of any key this codec produces.
    pub fn max_key_len(&self) -> usize {
        self.prefix.len() + FINGERPRINT_LEN
    }
}
