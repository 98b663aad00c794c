use super::{StoreBackend, StoreError};
use async_trait::async_trait;
use log::error;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::time::Duration;

/// Redis store. Expiry is delegated to the server through `PX`, so reads never
/// observe an expired record and sweeping is a no-op.
#[derive(Clone)]
pub struct RedisStore {
    conn_manager: ConnectionManager,
    prefix: String,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
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

        let conn_manager = match ConnectionManager::new(client).await {
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
            prefix: String::new(),
        })
    }

    /// A store sharing this connection whose keys all start with `prefix`
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self {
            conn_manager: self.conn_manager.clone(),
            prefix: prefix.to_string(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
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
impl StoreBackend for RedisStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let key = self.key(key);
        let mut conn = self.conn_manager.clone();
        let serialized = serde_json::to_string(value)?;

        let result = match ttl {
            Some(ttl) if ttl.is_zero() => {
                // Already expired: make sure no older value survives under this key
                conn.del::<_, ()>(&key).await
            }
            Some(ttl) => {
                let millis = ttl.as_millis().min(u64::MAX as u128) as u64;
                conn.pset_ex::<_, _, ()>(&key, serialized, millis).await
            }
            None => conn.set::<_, _, ()>(&key, serialized).await,
        };

        match result {
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
        let key = self.key(key);
        let mut conn = self.conn_manager.clone();

        let result: Option<String> = match conn.get(&key).await {
            Ok(value) => value,
            Err(err) => {
                error!("Redis error while getting key {}: {}", key, err);
                return Err(StoreError::Redis(err.to_string()));
            }
        };
        Self::decode(result)
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let key = self.key(key);
        let mut conn = self.conn_manager.clone();

        // GETDEL is atomic on the server: only one caller receives the value
        let result: Option<String> = match redis::cmd("GETDEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
        {
            Ok(value) => value,
            Err(err) => {
                error!("Redis error while taking key {}: {}", key, err);
                return Err(StoreError::Redis(err.to_string()));
            }
        };
        Self::decode(result)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = self.key(key);
        let mut conn = self.conn_manager.clone();

        match conn.del::<_, ()>(&key).await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("Redis error while deleting key {}: {}", key, err);
                Err(StoreError::Redis(err.to_string()))
            }
        }
    }

    async fn sweep_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Redis health check failed: {}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis_test::server::RedisServer;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        field: String,
    }

    fn get_redis_url(server: &RedisServer) -> String {
        match &server.addr {
            redis::ConnectionAddr::Tcp(host, port) => {
                format!("redis://{}:{}/", host, port)
            }
            _ => "redis://127.0.0.1:6379/".to_string(),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_store_operations() {
        // Start a Redis server for testing
        let server = RedisServer::new();
        let redis_url = get_redis_url(&server);

        let store = RedisStore::new(&redis_url)
            .await
            .unwrap()
            .with_prefix("test:");

        let data = TestData {
            field: "test".to_string(),
        };

        store
            .set("test_key", &data, Some(Duration::from_millis(500)))
            .await
            .unwrap();
        let retrieved: TestData = store.get("test_key").await.unwrap().unwrap();
        assert_eq!(data, retrieved);

        // Test expiration
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(store.get::<TestData>("test_key").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_take_is_single_use() {
        let server = RedisServer::new();
        let redis_url = get_redis_url(&server);
        let store = RedisStore::new(&redis_url).await.unwrap();

        store
            .set("code", &"payload", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(
            store.take::<String>("code").await.unwrap().as_deref(),
            Some("payload")
        );
        assert!(store.take::<String>("code").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_health_check() {
        let server = RedisServer::new();
        let redis_url = get_redis_url(&server);
        let store = RedisStore::new(&redis_url).await.unwrap();

        let result = store.health_check().await;
        assert!(result.is_ok(), "health check failed: {:?}", result);
    }
}
