//! Namespaced views over the shared [`Store`].

use super::{KvsBackend, Store, StoreError};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

pub const CLIENT_TTL: Duration = Duration::from_secs(90 * 24 * 60 * 60);
pub const AUTHORIZATION_CODE_TTL: Duration = Duration::from_secs(5 * 60);
pub const PENDING_AUTHORIZATION_TTL: Duration = Duration::from_secs(5 * 60);
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const UPSTREAM_CORRELATOR_TTL: Duration = Duration::from_secs(5 * 60);

/// A store handle bound to one logical prefix and one TTL.
///
/// Keys are written as `<prefix>:<key>`.
#[derive(Clone)]
pub struct Kvs {
    store: Store,
    prefix: String,
    ttl: Duration,
}

impl Kvs {
    pub fn new(store: Store, prefix: &str, ttl: Duration) -> Self {
        Self {
            store,
            prefix: format!("{prefix}:"),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        self.store.set(&self.key(key), value, self.ttl).await
    }

    pub async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.store.get(&self.key(key)).await
    }

    pub async fn get_del<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.store.get_del(&self.key(key)).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(&self.key(key)).await
    }
}
