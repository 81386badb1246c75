//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every instance any discovery source knows
//! - Feed outcomes into the service registry
//! - Log each health transition once

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::discovery::registry::HealthChange;
use crate::discovery::{ServiceInstance, ServiceRegistry};
use crate::health::probe::{HttpProber, Prober};
use crate::observability::metrics;

/// Outcome of one probing round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub healthy: usize,
    pub unhealthy: usize,
}

pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    prober: Arc<dyn Prober>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ServiceRegistry>, prober: Arc<dyn Prober>, config: HealthCheckConfig) -> Self {
        Self {
            registry,
            prober,
            config,
        }
    }

    /// Monitor probing over HTTP at the configured path.
    pub fn http(registry: Arc<ServiceRegistry>, config: HealthCheckConfig) -> Self {
        let prober = Arc::new(HttpProber::new(config.path.clone()));
        Self::new(registry, prober, config)
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            timeout = self.config.timeout_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.check_all().await;
                    tracing::debug!(healthy = summary.healthy, unhealthy = summary.unhealthy, "Health check round complete");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every known instance once, including those only seen in the
    /// store or the static table.
    pub async fn check_all(&self) -> CheckSummary {
        let instances = self.registry.probe_targets().await;
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let outcomes = join_all(instances.into_iter().map(|instance| async move {
            let healthy = match time::timeout(timeout, self.prober.probe(&instance)).await {
                Ok(healthy) => healthy,
                Err(_) => {
                    tracing::debug!(instance = %instance.instance_id, "Health check failed: timeout");
                    false
                }
            };
            self.apply(&instance, healthy).await;
            healthy
        }))
        .await;

        let healthy = outcomes.iter().filter(|h| **h).count();
        CheckSummary {
            healthy,
            unhealthy: outcomes.len() - healthy,
        }
    }

    async fn apply(&self, instance: &ServiceInstance, healthy: bool) {
        let change = self
            .registry
            .record_probe(&instance.service_name, &instance.instance_id, healthy)
            .await;

        match change {
            HealthChange::Recovered => tracing::info!(
                service = %instance.service_name,
                instance = %instance.instance_id,
                address = %instance.address(),
                "Instance recovered"
            ),
            HealthChange::Failed => tracing::warn!(
                service = %instance.service_name,
                instance = %instance.instance_id,
                address = %instance.address(),
                "Instance marked unhealthy"
            ),
            HealthChange::Unchanged => {}
        }

        metrics::record_instance_health(&instance.service_name, &instance.instance_id, healthy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscoveryConfig, StaticInstanceConfig};
    use crate::discovery::{KvStore, MemoryStore};
    use async_trait::async_trait;
    use dashmap::DashMap;

    /// Scripted prober: unknown ids are healthy, "hang" never answers.
    #[derive(Default)]
    struct ScriptedProber {
        down: DashMap<String, ()>,
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, instance: &ServiceInstance) -> bool {
            if instance.instance_id == "hang" {
                std::future::pending::<()>().await;
            }
            !self.down.contains_key(&instance.instance_id)
        }
    }

    async fn setup(ids: &[&str]) -> (Arc<ServiceRegistry>, Arc<ScriptedProber>, HealthMonitor) {
        let registry = Arc::new(ServiceRegistry::new(
            Arc::new(MemoryStore::new()),
            &DiscoveryConfig::default(),
        ));
        for id in ids {
            registry
                .register("files", ServiceInstance::new("files", *id, "10.0.0.1", 80))
                .await;
        }
        let prober = Arc::new(ScriptedProber::default());
        let monitor = HealthMonitor::new(registry.clone(), prober.clone(), HealthCheckConfig::default());
        (registry, prober, monitor)
    }

    #[tokio::test]
    async fn test_failed_probe_hides_until_recovery() {
        let (registry, prober, monitor) = setup(&["a", "b"]).await;

        prober.down.insert("a".into(), ());
        let summary = monitor.check_all().await;
        assert_eq!(summary, CheckSummary { healthy: 1, unhealthy: 1 });

        let ids: Vec<_> = registry
            .get_instances("files")
            .await
            .into_iter()
            .map(|i| i.instance_id)
            .collect();
        assert_eq!(ids, vec!["b"]);
        // Not removed, only hidden.
        assert_eq!(registry.known_instances().len(), 2);

        prober.down.remove("a");
        monitor.check_all().await;
        assert_eq!(registry.get_instances("files").await.len(), 2);
    }

    fn ids(instances: Vec<ServiceInstance>) -> Vec<String> {
        instances.into_iter().map(|i| i.instance_id).collect()
    }

    #[tokio::test]
    async fn test_failing_static_and_peer_instances_are_hidden() {
        let store = Arc::new(MemoryStore::new());
        let mut config = DiscoveryConfig::default();
        config.services.insert(
            "static-svc".into(),
            vec![StaticInstanceConfig {
                id: "s1".into(),
                host: "10.0.0.1".into(),
                port: 8000,
                metadata: Default::default(),
            }],
        );
        let registry = Arc::new(ServiceRegistry::new(store.clone(), &config));
        assert!(registry.bootstrap().await);

        // Registered by another gateway: present in the store only.
        let peer = ServiceInstance::new("peer-svc", "p1", "10.0.0.2", 8000);
        store
            .put(
                &peer.record_key(),
                serde_json::to_string(&peer).unwrap(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert!(registry.known_instances().is_empty());
        assert_eq!(ids(registry.get_instances("static-svc").await), vec!["s1"]);
        assert_eq!(ids(registry.get_instances("peer-svc").await), vec!["p1"]);

        let prober = Arc::new(ScriptedProber::default());
        prober.down.insert("s1".into(), ());
        prober.down.insert("p1".into(), ());
        let monitor = HealthMonitor::new(registry.clone(), prober.clone(), HealthCheckConfig::default());

        let summary = monitor.check_all().await;
        assert_eq!(summary, CheckSummary { healthy: 0, unhealthy: 2 });
        assert!(registry.get_instances("static-svc").await.is_empty());
        assert!(registry.get_instances("peer-svc").await.is_empty());
        assert!(registry.get_healthy_snapshot().await.values().all(|v| v.is_empty()));
        // The peer's record is left for its owner to refresh or let expire.
        assert_eq!(store.len(), 1);

        prober.down.clear();
        let summary = monitor.check_all().await;
        assert_eq!(summary, CheckSummary { healthy: 2, unhealthy: 0 });
        assert_eq!(ids(registry.get_instances("static-svc").await), vec!["s1"]);
        assert_eq!(ids(registry.get_instances("peer-svc").await), vec!["p1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_does_not_block_others() {
        let (registry, _prober, monitor) = setup(&["a", "hang"]).await;

        let summary = monitor.check_all().await;
        assert_eq!(summary, CheckSummary { healthy: 1, unhealthy: 1 });

        let ids: Vec<_> = registry
            .get_instances("files")
            .await
            .into_iter()
            .map(|i| i.instance_id)
            .collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (_registry, _prober, monitor) = setup(&["a"]).await;
        let (tx, rx) = broadcast::channel(1);

        let handle = monitor.spawn(rx);
        time::advance(Duration::from_secs(61)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_monitor_returns_immediately() {
        let (registry, prober, _) = setup(&[]).await;
        let config = HealthCheckConfig {
            enabled: false,
            ..Default::default()
        };
        let (_tx, rx) = broadcast::channel(1);
        HealthMonitor::new(registry, prober, config).run(rx).await;
    }
}
