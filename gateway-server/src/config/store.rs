use confique::Config;
use serde::{de, Deserialize, Deserializer};
use std::str::FromStr;

/// Specifies which store backend to use
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    InMemory,
    #[default]
    Redis,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "in-memory" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            other => Err(format!(
                "unknown store backend '{other}', expected 'redis' or 'in-memory'"
            )),
        }
    }
}

fn deserialize_backend<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<StoreBackend, D::Error> {
    String::deserialize(deserializer)?
        .parse()
        .map_err(de::Error::custom)
}

/// Configuration for the key-value store holding clients, codes and tokens
#[derive(Debug, Config, Clone)]
pub struct StoreConfig {
    /// Store backend: "redis" (default) or "in-memory"
    #[config(
        env = "GATEWAY_STORE_BACKEND",
        default = "redis",
        deserialize_with = deserialize_backend
    )]
    pub backend: StoreBackend,

    /// Redis connection string (default: redis://localhost:6379)
    #[config(env = "GATEWAY_STORE_REDIS_URL", default = "redis://localhost:6379")]
    pub redis_url: String,

    /// Maximum capacity of the in-memory store in MiB (default: 64)
    #[config(env = "GATEWAY_STORE_MEMORY_CAPACITY", default = 64)]
    pub memory_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            memory_capacity: 64,
        }
    }
}
