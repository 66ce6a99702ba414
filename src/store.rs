//! Encodability-enforcing facade over the store protocol
//!
//! [`ObjectStore`] sits directly on a [`StoreDriver`] and adds exactly one
//! precondition: a value being written must encode to JSON. A value that
//! does not encode fails with [`crate::Error::Encoding`] before any driver I/O
//! happens. Reads decode back into the caller's type through the same
//! representation.

use crate::driver::{StoreDriver, VersionToken};
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Typed read/write facade over the raw store primitives.
///
/// Cheap to clone; clones share the same driver.
#[derive(Clone)]
pub struct ObjectStore {
    driver: Arc<dyn StoreDriver>,
    expiration_secs: u64,
}

impl ObjectStore {
    /// Create a facade writing entries with the given default TTL
    /// (`0` = never expires).
    pub fn new(driver: Arc<dyn StoreDriver>, expiration_secs: u64) -> Self {
        Self {
            driver,
            expiration_secs,
        }
    }

    /// The TTL in seconds applied to every write.
    pub fn expiration_secs(&self) -> u64 {
        self.expiration_secs
    }

    fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Fetch and decode the value stored under `key`.
    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        match self.driver.get(key).await? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch the raw stored bytes under `key`.
    pub async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.driver.get(key).await
    }

    /// Fetch and decode the value under `key` along with its version token.
    pub async fn gets<V: DeserializeOwned>(&self, key: &str) -> Result<Option<(V, VersionToken)>> {
        match self.driver.gets(key).await? {
            Some((bytes, token)) => Ok(Some((Self::decode(&bytes)?, token))),
            None => Ok(None),
        }
    }

    /// Unconditionally store `value` under `key`.
    pub async fn set<V: Serialize>(&self, key: &str, value: &V) -> Result<()> {
        let bytes = Self::encode(value)?;
        debug!("Storing {} bytes under '{}'", bytes.len(), key);
        self.driver.set(key, bytes, self.expiration_secs).await
    }

    /// Store `value` under `key` only if no entry exists.
    pub async fn add<V: Serialize>(&self, key: &str, value: &V) -> Result<bool> {
        let bytes = Self::encode(value)?;
        self.driver.add(key, bytes, self.expiration_secs).await
    }

    /// Conditionally store `value` under `key` against `token`.
    pub async fn cas<V: Serialize>(&self, key: &str, value: &V, token: VersionToken) -> Result<bool> {
        let bytes = Self::encode(value)?;
        self.driver.cas(key, bytes, token).await
    }

    /// Delete the entry under `key`. Returns `true` if an entry existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.driver.delete(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::MemoryDriver;
    use crate::error::Error;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        id: u32,
        name: String,
    }

    fn store() -> ObjectStore {
        ObjectStore::new(Arc::new(MemoryDriver::new()), 0)
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let store = store();
        let payload = Payload {
            id: 7,
            name: "seven".to_string(),
        };

        store.set("k", &payload).await.unwrap();
        let loaded: Payload = store.get("k").await.unwrap().unwrap();
        assert_eq!(loaded, payload);
    }

    #[tokio::test]
    async fn test_non_encodable_value_fails_before_io() {
        let store = store();

        // Maps with non-string keys have no JSON representation.
        let mut bad: HashMap<(u32, u32), String> = HashMap::new();
        bad.insert((1, 2), "v".to_string());

        let err = store.set("k", &bad).await.unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));

        // Nothing reached the driver.
        assert!(store.get_raw("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gets_returns_token_usable_for_cas() {
        let store = store();

        store.set("k", &1u32).await.unwrap();
        let (value, token): (u32, VersionToken) = store.gets("k").await.unwrap().unwrap();
        assert_eq!(value, 1);

        assert!(store.cas("k", &2u32, token).await.unwrap());
        assert!(!store.cas("k", &3u32, token).await.unwrap());
        assert_eq!(store.get::<u32>("k").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_decode_mismatch_is_encoding_error() {
        let store = store();

        store.set("k", &"text").await.unwrap();
        let err = store.get::<u32>("k").await.unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
    }
}
