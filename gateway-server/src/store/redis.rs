use super::{KvsBackend, StoreError};
use async_trait::async_trait;
use log::error;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

// TODO derive Debug - https://stackoverflow.com/questions/78870773/skip-struct-field-when-deriving-debug
#[derive(Clone)]
pub struct RedisStore {
    _client: Client,
    conn_manager: ConnectionManager,
}

impl RedisStore {
    /// Initialize a new Redis store instance
    pub async fn new(redis_url: &str) -> Result<Self, String> {
        let client = match Client::open(redis_url) {
            Ok(client) => client,
            Err(err) => {
                return Err(format!("Failed to connect to Redis: {}", err));
            }
        };

        let conn_manager = match ConnectionManager::new(client.clone()).await {
            Ok(manager) => manager,
            Err(err) => {
                return Err(format!(
                    "Failed to create Redis connection manager: {}",
                    err
                ));
            }
        };

        // Test the connection to ensure it's working
        let mut conn = conn_manager.clone();
        if let Err(err) = redis::cmd("PING").query_async::<String>(&mut conn).await {
            return Err(format!("Failed to ping Redis: {}", err));
        }

        Ok(Self {
            conn_manager,
            _client: client,
        })
    }

    fn decode<T: DeserializeOwned>(value: Option<String>) -> Result<Option<T>, StoreError> {
        match value {
            Some(value) => serde_json::from_str(&value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))
                .map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl KvsBackend for RedisStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();
        // SET EX rejects a zero expiry
        let ttl_secs = ttl.as_secs().max(1);

        match conn.set_ex::<_, _, ()>(key, serialized, ttl_secs).await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("Redis error while setting key {}: {}", key, err);
                Err(StoreError::Redis(err.to_string()))
            }
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn_manager.clone();

        let result: Option<String> = match conn.get(key).await {
            Ok(value) => value,
            Err(err) => {
                error!("Redis error while getting key {}: {}", key, err);
                return Err(StoreError::Redis(err.to_string()));
            }
        };

        Self::decode(result)
    }

    async fn get_del<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn_manager.clone();

        // GETDEL is a single command, so concurrent callers cannot both see the value
        let result: Option<String> = match redis::cmd("GETDEL")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
        {
            Ok(value) => value,
            Err(err) => {
                error!("Redis error while consuming key {}: {}", key, err);
                return Err(StoreError::Redis(err.to_string()));
            }
        };

        Self::decode(result)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();

        match conn.del::<_, ()>(key).await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("Redis error while deleting key {}: {}", key, err);
                Err(StoreError::Redis(err.to_string()))
            }
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Redis health check failed: {}", err)),
        }
    }
}
