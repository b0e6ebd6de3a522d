use super::{KvsBackend, StoreError};
use async_trait::async_trait;
use moka::{future::Cache as MokaCache, Expiry};
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};

/// Serialized value plus the TTL it was written with
#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Duration,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Expires each entry after the TTL given to `set`, counted from its last write
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Clone)]
pub struct InMemoryStore {
    cache: MokaCache<String, Entry>,
}

impl InMemoryStore {
    /// Initialize a new in-memory store bounded to `capacity_mib` of serialized values
    pub fn new(capacity_mib: usize) -> Result<Self, String> {
        let max_capacity_bytes: u64 = capacity_mib
            .checked_mul(1024 * 1024)
            .and_then(|bytes| u64::try_from(bytes).ok())
            .ok_or_else(|| format!("Store capacity overflow: {capacity_mib} MiB"))?;

        let cache = MokaCache::builder()
            .expire_after(PerEntryTtl)
            .weigher(|key: &String, entry: &Entry| -> u32 {
                (key.len() + entry.value.len())
                    .try_into()
                    .unwrap_or(u32::MAX)
            })
            .max_capacity(max_capacity_bytes)
            .build();

        Ok(Self { cache })
    }

    fn decode<T: DeserializeOwned>(entry: Option<Entry>) -> Result<Option<T>, StoreError> {
        match entry {
            Some(entry) if entry.is_live() => serde_json::from_str(&entry.value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))
                .map(Some),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl KvsBackend for InMemoryStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let entry = Entry {
            value: serde_json::to_string(value)?,
            ttl,
            expires_at: Instant::now() + ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        Self::decode(self.cache.get(key).await)
    }

    async fn get_del<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        // moka removes under the key's lock, so only one caller gets the entry back
        Self::decode(self.cache.remove(key).await)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}
