use super::{StoreBackend, StoreError};
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};

/// A serialized record and the instant it stops being valid
#[derive(Clone, Debug)]
struct Entry {
    payload: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

#[derive(Clone, Debug)]
pub struct InMemoryStore {
    cache: MokaCache<String, Entry>,
}

impl InMemoryStore {
    /// Initialize a new in-memory store bounded to `capacity_mib` MiB of payload
    pub fn new(capacity_mib: usize) -> Self {
        // 1 MiB = 1024 * 1024 bytes
        let max_capacity_bytes = (capacity_mib as u64).saturating_mul(1024 * 1024);

        let cache = MokaCache::builder()
            .weigher(|key: &String, entry: &Entry| -> u32 {
                (key.len() + entry.payload.len())
                    .try_into()
                    .unwrap_or(u32::MAX)
            })
            .max_capacity(max_capacity_bytes)
            .build();

        Self { cache }
    }

    /// Initialize a store that never evicts a live record to make room.
    /// Records leave only when deleted, taken or swept after expiry.
    pub fn unbounded() -> Self {
        Self {
            cache: MokaCache::builder().build(),
        }
    }

    fn decode<T: DeserializeOwned>(entry: Entry) -> Result<Option<T>, StoreError> {
        if entry.is_expired() {
            return Ok(None);
        }
        serde_json::from_str(&entry.payload)
            .map_err(|e| StoreError::Deserialization(e.to_string()))
            .map(Some)
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let entry = Entry {
            payload: serde_json::to_string(value)?,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.cache.get(key).await {
            Some(entry) if entry.is_expired() => {
                self.cache.invalidate(key).await;
                Ok(None)
            }
            Some(entry) => Self::decode(entry),
            None => Ok(None),
        }
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        // `remove` hands the entry to exactly one caller
        match self.cache.remove(key).await {
            Some(entry) if entry.is_expired() => Ok(None),
            Some(entry) => Self::decode(entry),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize, StoreError> {
        let expired: Vec<String> = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for key in &expired {
            self.cache.invalidate(key).await;
        }
        self.cache.run_pending_tasks().await;
        Ok(expired.len())
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        field: String,
    }

    #[tokio::test]
    async fn test_store_operations() {
        let store = InMemoryStore::new(16);

        let data = TestData {
            field: "test".to_string(),
        };

        store
            .set("test_key", &data, Some(Duration::from_millis(200)))
            .await
            .unwrap();
        let retrieved: TestData = store.get("test_key").await.unwrap().unwrap();
        assert_eq!(data, retrieved);

        // Test expiration
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(store.get::<TestData>("test_key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_never_readable() {
        let store = InMemoryStore::new(16);
        store.set("key", &"value", Some(Duration::ZERO)).await.unwrap();
        assert!(store.get::<String>("key").await.unwrap().is_none());
        assert!(store.take::<String>("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_take_yields_once() {
        let store = Arc::new(InMemoryStore::new(16));
        store
            .set("code", &"payload", Some(Duration::from_secs(60)))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.take::<String>("code").await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let store = InMemoryStore::new(16);
        store.set("a", &1, Some(Duration::ZERO)).await.unwrap();
        store.set("b", &2, Some(Duration::ZERO)).await.unwrap();
        store.set("c", &3, None).await.unwrap();

        assert_eq!(store.sweep_expired().await.unwrap(), 2);
        assert_eq!(store.sweep_expired().await.unwrap(), 0);
        assert_eq!(store.get::<i32>("c").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_unbounded_store_keeps_every_record() {
        let store = InMemoryStore::unbounded();
        let payload = "x".repeat(4096);
        for i in 0..2_000 {
            store.set(&format!("key-{i}"), &payload, None).await.unwrap();
        }
        store.sweep_expired().await.unwrap();

        for i in 0..2_000 {
            assert!(
                store.get::<String>(&format!("key-{i}")).await.unwrap().is_some(),
                "key-{i} was evicted"
            );
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let store = InMemoryStore::new(1);
        let result = store.health_check().await;
        assert!(result.is_ok(), "health check failed: {:?}", result);
    }
}
