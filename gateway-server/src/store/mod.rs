use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod namespace;
pub mod redis;

pub use namespace::Kvs;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse value: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Key-value store contract shared by every backend.
///
/// All state that has to survive between independent HTTP requests (clients,
/// pending authorizations, codes, tokens, upstream correlators) lives behind
/// this trait. Every entry carries its own TTL and expiry is the only cleanup
/// mechanism.
///
/// `get_del` must be linearizable per key: when several callers race on the
/// same key exactly one of them observes the value.
#[async_trait::async_trait]
pub trait KvsBackend: Send + Sync {
    /// Store a value under `key`, replacing any previous value and resetting its TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Retrieve a value, `None` if absent or expired
    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError>;

    /// Atomically retrieve and remove a value
    async fn get_del<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError>;

    /// Delete a value from the store
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Checks connectivity to the backend.
    ///
    /// For Redis this pings the server, the in-memory store is always healthy.
    async fn health_check(&self) -> Result<(), String>;
}

/// Store implementation chosen at runtime from the configuration.
#[derive(Clone)]
pub enum Store {
    /// In-memory store using Moka
    InMemory(memory::InMemoryStore),
    /// Redis-backed store
    Redis(redis::RedisStore),
}

#[async_trait::async_trait]
impl KvsBackend for Store {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        match self {
            Self::InMemory(store) => store.set(key, value, ttl).await,
            Self::Redis(store) => store.set(key, value, ttl).await,
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self {
            Self::InMemory(store) => store.get(key).await,
            Self::Redis(store) => store.get(key).await,
        }
    }

    async fn get_del<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self {
            Self::InMemory(store) => store.get_del(key).await,
            Self::Redis(store) => store.get_del(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self {
            Self::InMemory(store) => store.delete(key).await,
            Self::Redis(store) => store.delete(key).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(store) => store.health_check().await,
            Self::Redis(store) => store.health_check().await,
        }
    }
}

/// Creates the store backend selected in the configuration.
///
/// The Redis backend is pinged once during construction so a misconfigured
/// URL fails at startup instead of on the first login.
pub async fn create_store(config: &crate::config::StoreConfig) -> Result<Store, StoreError> {
    match config.backend {
        crate::config::StoreBackend::InMemory => {
            let store =
                memory::InMemoryStore::new(config.memory_capacity).map_err(StoreError::Config)?;
            Ok(Store::InMemory(store))
        }
        crate::config::StoreBackend::Redis => {
            if config.redis_url.is_empty() {
                return Err(StoreError::Config(
                    "Redis URL is required for the Redis store".to_string(),
                ));
            }
            let store = redis::RedisStore::new(&config.redis_url)
                .await
                .map_err(StoreError::Config)?;
            Ok(Store::Redis(store))
        }
    }
}
