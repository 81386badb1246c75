//! TTL key-value store abstraction backing service registration.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::StoreError;

/// A TTL-capable key-value store.
///
/// Values are opaque strings; the registry stores JSON-encoded
/// `ServiceInstance` records under `service:<name>:<instanceId>`.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Write `value` under `key`, expiring after `ttl` unless written again.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Values of every live key starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Run a store call under a deadline.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout.as_millis() as u64)),
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process store with lazy expiry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.expires_at > now);
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.purge_expired();
        let mut matches: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| (e.key().clone(), e.value().value.clone()))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matches.into_iter().map(|(_, v)| v).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store
            .put("service:files:a", "a".into(), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .put("service:files:b", "b".into(), Duration::from_secs(120))
            .await
            .unwrap();
        store
            .put("service:users:c", "c".into(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.scan_prefix("service:files:").await.unwrap(), vec!["a", "b"]);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.scan_prefix("service:files:").await.unwrap(), vec!["b"]);
        assert_eq!(store.len(), 1);

        // Refreshing extends the lease.
        store
            .put("service:files:b", "b2".into(), Duration::from_secs(120))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(store.scan_prefix("service:files:").await.unwrap(), vec!["b2"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store.put("k", "v".into(), Duration::from_secs(5)).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.is_empty());
        // Deleting a missing key is not an error.
        store.delete("k").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, StoreError>(())
        };
        let err = bounded(Duration::from_millis(100), slow).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(100)));
    }
}
