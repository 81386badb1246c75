//! Service registry.
//!
//! # Responsibilities
//! - Keep the in-memory view of registered instances (fallback of record)
//! - Mirror registrations into the TTL store, best effort
//! - Answer discovery queries through the ordered source chain
//! - Apply health-probe outcomes and refresh leases of healthy instances
//! - Track probe outcomes for instances it only sees through the store or
//!   the static table, so those are hidden when they fail too

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::clock::unix_millis;
use crate::config::{DiscoveryConfig, StaticInstanceConfig};
use crate::discovery::instance::{record_key, ServiceInstance};
use crate::discovery::source::{
    static_instances, InstanceMap, InstanceSource, MemorySource, StaticInstances, StaticSource,
    StoreSource,
};
use crate::discovery::store::{bounded, KvStore};
use crate::observability::metrics;

/// Outcome of applying a probe result to a known instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthChange {
    Unchanged,
    Recovered,
    Failed,
}

/// Last probe outcome of an instance that is not in the in-memory view.
#[derive(Debug, Clone, Copy)]
struct HealthMark {
    healthy: bool,
    last_health_check: u64,
}

pub struct ServiceRegistry {
    store: Arc<dyn KvStore>,
    local: Arc<InstanceMap>,
    observed: DashMap<(String, String), HealthMark>,
    fallback: Arc<ArcSwap<StaticInstances>>,
    sources: Vec<Box<dyn InstanceSource>>,
    ttl: Duration,
    store_timeout: Duration,
}

impl ServiceRegistry {
    /// Create a registry over `store` with the standard store → memory → static chain.
    pub fn new(store: Arc<dyn KvStore>, config: &DiscoveryConfig) -> Self {
        let local = Arc::new(InstanceMap::new());
        let fallback = Arc::new(ArcSwap::from_pointee(static_instances(&config.services)));
        let store_timeout = Duration::from_millis(config.store_timeout_ms);

        let sources: Vec<Box<dyn InstanceSource>> = vec![
            Box::new(StoreSource::new(store.clone(), store_timeout)),
            Box::new(MemorySource::new(local.clone())),
            Box::new(StaticSource::new(fallback.clone())),
        ];

        Self {
            store,
            local,
            observed: DashMap::new(),
            fallback,
            sources,
            ttl: Duration::from_secs(config.instance_ttl_secs),
            store_timeout,
        }
    }

    /// Check the store; seed the in-memory view from static config when it is unreachable.
    ///
    /// Returns whether the store answered.
    pub async fn bootstrap(&self) -> bool {
        match bounded(self.store_timeout, self.store.ping()).await {
            Ok(()) => {
                tracing::info!(store = self.store.name(), "Discovery store reachable");
                true
            }
            Err(e) => {
                let seeded = self.load_static();
                tracing::warn!(
                    store = self.store.name(),
                    error = %e,
                    seeded,
                    "Discovery store unreachable, loaded static instances"
                );
                false
            }
        }
    }

    /// Copy the static instances into the in-memory view so they are probed
    /// like registered ones. Existing entries are kept. Returns the number of
    /// static instances considered.
    pub fn load_static(&self) -> usize {
        let table = self.fallback.load();
        let mut seeded = 0;
        for (service, instances) in table.iter() {
            let mut known = self.local.entry(service.clone()).or_default();
            for instance in instances {
                known
                    .entry(instance.instance_id.clone())
                    .or_insert_with(|| instance.clone());
                seeded += 1;
            }
        }
        seeded
    }

    /// Upsert an instance locally and write its TTL record.
    pub async fn register(&self, service: &str, mut instance: ServiceInstance) {
        instance.service_name = service.to_string();
        let key = instance.record_key();

        self.local
            .entry(service.to_string())
            .or_default()
            .insert(instance.instance_id.clone(), instance.clone());

        tracing::info!(
            service = %service,
            instance = %instance.instance_id,
            address = %instance.address(),
            "Instance registered"
        );

        self.write_record(&key, &instance).await;
    }

    /// Remove an instance locally and delete its record, best effort.
    ///
    /// Returns whether the instance was known locally.
    pub async fn deregister(&self, service: &str, instance_id: &str) -> bool {
        let removed = match self.local.get_mut(service) {
            Some(mut instances) => instances.remove(instance_id).is_some(),
            None => false,
        };
        self.local.remove_if(service, |_, instances| instances.is_empty());
        self.observed
            .remove(&(service.to_string(), instance_id.to_string()));

        let key = record_key(service, instance_id);
        if let Err(e) = bounded(self.store_timeout, self.store.delete(&key)).await {
            metrics::record_store_error("delete");
            tracing::warn!(key = %key, error = %e, "Failed to delete registration record");
        }

        tracing::info!(service = %service, instance = %instance_id, removed, "Instance deregistered");
        removed
    }

    /// Healthy instances of `service`, ascending by instance id.
    pub async fn get_instances(&self, service: &str) -> Vec<ServiceInstance> {
        for (position, source) in self.sources.iter().enumerate() {
            match source.instances(service).await {
                Ok(found) if !found.is_empty() => {
                    if position > 0 {
                        tracing::debug!(service = %service, source = source.name(), "Served from fallback source");
                    }
                    return self.healthy_only(found);
                }
                Ok(_) => {
                    metrics::record_discovery_fallback(source.name());
                    tracing::trace!(service = %service, source = source.name(), "Source has no instances");
                }
                Err(e) => {
                    metrics::record_discovery_fallback(source.name());
                    tracing::warn!(
                        service = %service,
                        source = source.name(),
                        error = %e,
                        "Discovery source failed, falling through"
                    );
                }
            }
        }
        Vec::new()
    }

    /// Healthy instances of every known service.
    pub async fn get_healthy_snapshot(&self) -> BTreeMap<String, Vec<ServiceInstance>> {
        let mut names = BTreeSet::new();
        for source in &self.sources {
            match source.service_names().await {
                Ok(found) => names.extend(found),
                Err(e) => tracing::warn!(source = source.name(), error = %e, "Failed to list services"),
            }
        }

        let mut snapshot = BTreeMap::new();
        for name in names {
            let instances = self.get_instances(&name).await;
            snapshot.insert(name, instances);
        }
        snapshot
    }

    /// Every locally known instance, healthy or not.
    pub fn known_instances(&self) -> Vec<ServiceInstance> {
        self.local
            .iter()
            .flat_map(|entry| entry.value().values().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Every instance any source knows, healthy or not, once per
    /// `(service, instance id)`. The in-memory entry wins over copies seen in
    /// the store or the static table.
    ///
    /// Outcomes remembered for instances no source reports any more are dropped.
    pub async fn probe_targets(&self) -> Vec<ServiceInstance> {
        let mut targets: BTreeMap<(String, String), ServiceInstance> = self
            .known_instances()
            .into_iter()
            .map(|i| ((i.service_name.clone(), i.instance_id.clone()), i))
            .collect();

        for source in &self.sources {
            let names = match source.service_names().await {
                Ok(names) => names,
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "Failed to list services for probing");
                    continue;
                }
            };
            for name in names {
                match source.instances(&name).await {
                    Ok(found) => {
                        for instance in found {
                            targets
                                .entry((instance.service_name.clone(), instance.instance_id.clone()))
                                .or_insert(instance);
                        }
                    }
                    Err(e) => tracing::warn!(
                        service = %name,
                        source = source.name(),
                        error = %e,
                        "Failed to list instances for probing"
                    ),
                }
            }
        }

        self.observed.retain(|key, _| targets.contains_key(key));
        targets.into_values().collect()
    }

    /// Apply a probe outcome. Healthy in-memory instances get their lease
    /// refreshed; failing ones keep their record untouched so it expires on
    /// its own. Instances seen only in the store or the static table have
    /// their outcome remembered and overlaid on later reads; their records
    /// belong to whoever registered them and are not rewritten.
    pub async fn record_probe(&self, service: &str, instance_id: &str, healthy: bool) -> HealthChange {
        let updated = {
            let Some(mut instances) = self.local.get_mut(service) else {
                return self.observe(service, instance_id, healthy);
            };
            let Some(instance) = instances.get_mut(instance_id) else {
                return self.observe(service, instance_id, healthy);
            };

            let was_healthy = instance.healthy;
            instance.healthy = healthy;
            if healthy {
                instance.last_health_check = unix_millis();
            }
            let change = match (was_healthy, healthy) {
                (false, true) => HealthChange::Recovered,
                (true, false) => HealthChange::Failed,
                _ => HealthChange::Unchanged,
            };
            (change, instance.clone())
        };

        let (change, instance) = updated;
        if healthy {
            let key = instance.record_key();
            self.write_record(&key, &instance).await;
            if !self.is_local(service, instance_id) {
                // Deregistered while the write was in flight.
                if let Err(e) = bounded(self.store_timeout, self.store.delete(&key)).await {
                    metrics::record_store_error("delete");
                    tracing::warn!(key = %key, error = %e, "Failed to delete stale registration record");
                }
            }
        }
        change
    }

    /// Whether a registered instance of `service` still exists under `instance_id`,
    /// in memory, the store or the static table.
    pub async fn is_known(&self, service: &str, instance_id: &str) -> bool {
        if self.is_local(service, instance_id) {
            return true;
        }
        for source in &self.sources {
            if let Ok(found) = source.instances(service).await {
                if found.iter().any(|i| i.instance_id == instance_id) {
                    return true;
                }
            }
        }
        false
    }

    fn is_local(&self, service: &str, instance_id: &str) -> bool {
        self.local
            .get(service)
            .is_some_and(|instances| instances.contains_key(instance_id))
    }

    fn observe(&self, service: &str, instance_id: &str, healthy: bool) -> HealthChange {
        let mark = HealthMark {
            healthy,
            last_health_check: if healthy { unix_millis() } else { 0 },
        };
        let previous = self
            .observed
            .insert((service.to_string(), instance_id.to_string()), mark);

        // Records are written healthy, so an unseen instance starts out healthy.
        let was_healthy = previous.map(|p| p.healthy).unwrap_or(true);
        match (was_healthy, healthy) {
            (false, true) => HealthChange::Recovered,
            (true, false) => HealthChange::Failed,
            _ => HealthChange::Unchanged,
        }
    }

    /// Replace the static fallback table.
    pub fn replace_static(&self, services: &HashMap<String, Vec<StaticInstanceConfig>>) {
        self.fallback.store(Arc::new(static_instances(services)));
    }

    async fn write_record(&self, key: &str, instance: &ServiceInstance) {
        let value = match serde_json::to_string(instance) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to encode registration record");
                return;
            }
        };

        if let Err(e) = bounded(self.store_timeout, self.store.put(key, value, self.ttl)).await {
            metrics::record_store_error("put");
            tracing::warn!(
                key = %key,
                store = self.store.name(),
                error = %e,
                "Failed to write registration record, keeping in-memory entry"
            );
        }
    }

    /// Local health observations win over whatever the record says.
    fn healthy_only(&self, found: Vec<ServiceInstance>) -> Vec<ServiceInstance> {
        let mut healthy: Vec<ServiceInstance> = found
            .into_iter()
            .map(|mut instance| {
                if let Some(instances) = self.local.get(&instance.service_name) {
                    if let Some(known) = instances.get(&instance.instance_id) {
                        instance.healthy = known.healthy;
                        instance.last_health_check = known.last_health_check;
                        return instance;
                    }
                }
                let key = (instance.service_name.clone(), instance.instance_id.clone());
                if let Some(mark) = self.observed.get(&key) {
                    instance.healthy = mark.healthy;
                    if mark.healthy {
                        instance.last_health_check = mark.last_health_check;
                    }
                }
                instance
            })
            .filter(|instance| instance.healthy)
            .collect();
        healthy.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        healthy
    }
}
