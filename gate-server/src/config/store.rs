use confique::Config;
use serde::Deserialize;

/// Specifies which store implementation to use
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    #[default]
    InMemory,
    Redis,
}

/// Configuration for the storage subsystem
#[derive(Debug, Config, Clone)]
pub struct StoreConfig {
    /// Store type: "in-memory" (default) or "redis"
    #[config(env = "GATE_STORE_BACKEND", default = "in-memory")]
    pub backend: StoreKind,

    /// Seconds between two expiry sweeps (default: 60)
    #[config(env = "GATE_STORE_SWEEP_INTERVAL", default = 60)]
    pub sweep_interval: u64,

    /// In-memory store specific configuration
    #[config(nested)]
    pub memory: InMemoryConfig,

    /// Redis store specific configuration
    #[config(nested)]
    pub redis: RedisConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreKind::InMemory,
            sweep_interval: 60,
            memory: InMemoryConfig::default(),
            redis: RedisConfig::default(),
        }
    }
}

/// In-memory store configuration options
#[derive(Debug, Config, Clone)]
pub struct InMemoryConfig {
    /// Maximum size of the authorization code store in MiB (default: 64 MiB)
    #[config(env = "GATE_STORE_MEMORY_CAPACITY", default = 64)]
    pub capacity: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

/// Redis store configuration options
#[derive(Debug, Config, Clone, Default)]
pub struct RedisConfig {
    /// Redis connection string
    #[config(env = "GATE_STORE_REDIS_URL", default = "")]
    pub url: String,
}
