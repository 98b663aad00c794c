use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod redis;

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

/// Contract shared by every storage backend.
///
/// Every record is written with its own time-to-live. Reads never return an
/// expired record, whether or not the backend has purged it yet. `take` is the
/// only way to consume a single-use record: it removes and returns the value
/// atomically, so two concurrent callers can never both receive it.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Store a value that expires after `ttl`, or never when `ttl` is `None`
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Retrieve a live value
    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError>;

    /// Remove a value and return it if it was live
    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError>;

    /// Delete a value
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Purge expired records, returning how many were removed
    async fn sweep_expired(&self) -> Result<usize, StoreError>;

    /// Checks that the backend is reachable
    async fn health_check(&self) -> Result<(), String>;
}

/// Store implementation chosen at runtime from the configuration
#[derive(Clone, Debug)]
pub enum Store {
    /// In-memory store using Moka
    InMemory(memory::InMemoryStore),
    /// Redis-based store shared between replicas
    Redis(redis::RedisStore),
}

#[async_trait]
impl StoreBackend for Store {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
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

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self {
            Self::InMemory(store) => store.take(key).await,
            Self::Redis(store) => store.take(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self {
            Self::InMemory(store) => store.delete(key).await,
            Self::Redis(store) => store.delete(key).await,
        }
    }

    async fn sweep_expired(&self) -> Result<usize, StoreError> {
        match self {
            Self::InMemory(store) => store.sweep_expired().await,
            Self::Redis(store) => store.sweep_expired().await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(store) => store.health_check().await,
            Self::Redis(store) => store.health_check().await,
        }
    }
}

/// One store per concern. With Redis the stores share a server and are told
/// apart by a key prefix.
#[derive(Clone, Debug)]
pub struct Stores {
    pub clients: Store,
    pub pending: Store,
    pub codes: Store,
    pub revoked: Store,
}

impl Stores {
    /// Pairs each store with its name, for health reporting and sweeping
    pub fn named(&self) -> Vec<(&'static str, Store)> {
        vec![
            ("clients", self.clients.clone()),
            ("pending", self.pending.clone()),
            ("codes", self.codes.clone()),
            ("revoked", self.revoked.clone()),
        ]
    }

    /// Creates in-memory stores without consulting any configuration
    #[cfg(test)]
    pub fn in_memory() -> Self {
        let unbounded = || Store::InMemory(memory::InMemoryStore::unbounded());
        Self {
            clients: unbounded(),
            pending: unbounded(),
            codes: Store::InMemory(memory::InMemoryStore::new(16)),
            revoked: unbounded(),
        }
    }
}

/// Creates the stores selected by the configuration
pub async fn create_stores(config: &crate::config::GateConfig) -> Result<Stores, StoreError> {
    match config.store.backend {
        crate::config::StoreKind::InMemory => {
            // Only authorization codes are evicted for space. Clients are capped at
            // registration, the others are bounded by their TTL.
            let unbounded = || Store::InMemory(memory::InMemoryStore::unbounded());
            Ok(Stores {
                clients: unbounded(),
                pending: unbounded(),
                codes: Store::InMemory(memory::InMemoryStore::new(config.store.memory.capacity)),
                revoked: unbounded(),
            })
        }
        crate::config::StoreKind::Redis => {
            if config.store.redis.url.is_empty() {
                return Err(StoreError::Config(
                    "Redis URL is required for Redis store".to_string(),
                ));
            }
            let base = redis::RedisStore::new(&config.store.redis.url)
                .await
                .map_err(StoreError::Config)?;
            Ok(Stores {
                clients: Store::Redis(base.with_prefix("gate:client:")),
                pending: Store::Redis(base.with_prefix("gate:pending:")),
                codes: Store::Redis(base.with_prefix("gate:code:")),
                revoked: Store::Redis(base.with_prefix("gate:revoked:")),
            })
        }
    }
}

/// Expiry sweep over all stores, run periodically by the sweeper
#[derive(Debug)]
pub struct ExpirySweep {
    stores: Stores,
}

impl ExpirySweep {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }
}

#[async_trait]
impl sweeper::Sweep for ExpirySweep {
    fn name(&self) -> &str {
        "store-expiry"
    }

    async fn sweep(&self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let mut purged = 0;
        for (name, store) in self.stores.named() {
            let removed = store.sweep_expired().await?;
            if removed > 0 {
                log::debug!("Purged {} expired records from the {} store", removed, name);
            }
            purged += removed;
        }
        Ok(purged)
    }
}
