//! etcd-backed registration store.
//!
//! Each put grants a lease of the requested TTL and attaches it to the key,
//! so records vanish on their own once the health loop stops refreshing them.

use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, GetOptions, PutOptions};

use crate::config::StoreConfig;
use crate::discovery::store::KvStore;
use crate::error::StoreError;

pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connect to the configured endpoints.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = ConnectOptions::new()
            .with_connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        let client = Client::connect(config.endpoints.clone(), Some(options)).await?;
        tracing::info!(endpoints = ?config.endpoints, "Connected to etcd");
        Ok(Self { client })
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    fn name(&self) -> &'static str {
        "etcd"
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        let lease = client.lease_grant(ttl.as_secs().max(1) as i64, None).await?;
        client
            .put(key, value, Some(PutOptions::new().with_lease(lease.id())))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client.delete(key, None).await?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut client = self.client.clone();
        let response = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;

        let mut values = Vec::with_capacity(response.kvs().len());
        for kv in response.kvs() {
            values.push(kv.value_str()?.to_string());
        }
        Ok(values)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client.status().await?;
        Ok(())
    }
}
