//! Ordered discovery sources.
//!
//! The registry asks each source in turn; the first one answering with a
//! non-empty list wins. Errors and empty answers fall through.
//!
//! ```text
//! store  (live TTL records, bounded by the store timeout)
//!   → memory (registered / bootstrapped instances)
//!   → static (operator configuration, hot-swappable)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::config::StaticInstanceConfig;
use crate::discovery::instance::{service_prefix, ServiceInstance, RECORD_PREFIX};
use crate::discovery::store::{bounded, KvStore};
use crate::error::StoreError;

/// Locally known instances: service name → instance id → instance.
///
/// The inner `BTreeMap` keeps instances in ascending id order.
pub type InstanceMap = DashMap<String, BTreeMap<String, ServiceInstance>>;

/// Operator-supplied instances, swapped wholesale on reload.
pub type StaticInstances = HashMap<String, Vec<ServiceInstance>>;

#[async_trait]
pub trait InstanceSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every instance this source knows for `service`, healthy or not.
    async fn instances(&self, service: &str) -> Result<Vec<ServiceInstance>, StoreError>;

    /// Names of the services this source knows about.
    async fn service_names(&self) -> Result<Vec<String>, StoreError>;
}

/// Live records from the backing store.
pub struct StoreSource {
    store: Arc<dyn KvStore>,
    timeout: Duration,
}

impl StoreSource {
    pub fn new(store: Arc<dyn KvStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<ServiceInstance>, StoreError> {
        let values = bounded(self.timeout, self.store.scan_prefix(prefix)).await?;
        let mut instances = Vec::with_capacity(values.len());
        for value in values {
            match serde_json::from_str::<ServiceInstance>(&value) {
                Ok(instance) => instances.push(instance),
                Err(e) => tracing::warn!(
                    store = self.store.name(),
                    error = %e,
                    "Skipping malformed registration record"
                ),
            }
        }
        Ok(instances)
    }
}

#[async_trait]
impl InstanceSource for StoreSource {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn instances(&self, service: &str) -> Result<Vec<ServiceInstance>, StoreError> {
        let mut instances = self.scan(&service_prefix(service)).await?;
        // `service:a:` is also a prefix of `service:a:b:` records.
        instances.retain(|i| i.service_name == service);
        Ok(instances)
    }

    async fn service_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self
            .scan(&format!("{}:", RECORD_PREFIX))
            .await?
            .into_iter()
            .map(|i| i.service_name)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// The registry's in-memory view.
pub struct MemorySource {
    local: Arc<InstanceMap>,
}

impl MemorySource {
    pub fn new(local: Arc<InstanceMap>) -> Self {
        Self { local }
    }
}

#[async_trait]
impl InstanceSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn instances(&self, service: &str) -> Result<Vec<ServiceInstance>, StoreError> {
        Ok(self
            .local
            .get(service)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn service_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.local.iter().map(|e| e.key().clone()).collect())
    }
}

/// Static configuration of last resort.
pub struct StaticSource {
    instances: Arc<ArcSwap<StaticInstances>>,
}

impl StaticSource {
    pub fn new(instances: Arc<ArcSwap<StaticInstances>>) -> Self {
        Self { instances }
    }
}

#[async_trait]
impl InstanceSource for StaticSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn instances(&self, service: &str) -> Result<Vec<ServiceInstance>, StoreError> {
        Ok(self.instances.load().get(service).cloned().unwrap_or_default())
    }

    async fn service_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.instances.load().keys().cloned().collect())
    }
}

/// Build the static instance table, every instance marked healthy.
pub fn static_instances(services: &HashMap<String, Vec<StaticInstanceConfig>>) -> StaticInstances {
    services
        .iter()
        .map(|(service, configs)| {
            let mut instances: Vec<ServiceInstance> = configs
                .iter()
                .map(|c| {
                    let mut instance = ServiceInstance::new(service, &c.id, &c.host, c.port);
                    instance.metadata = c.metadata.clone();
                    instance
                })
                .collect();
            instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
            (service.clone(), instances)
        })
        .collect()
}
