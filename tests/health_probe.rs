//! Active HTTP health probing against real sockets.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_router::config::{DiscoveryConfig, HealthCheckConfig, StaticInstanceConfig};
use gateway_router::discovery::{KvStore, MemoryStore, ServiceInstance, ServiceRegistry};
use gateway_router::health::{CheckSummary, HealthMonitor};

mod common;

fn probe_config() -> HealthCheckConfig {
    HealthCheckConfig {
        timeout_secs: 1,
        ..Default::default()
    }
}

fn ids(instances: &[ServiceInstance]) -> Vec<&str> {
    instances.iter().map(|i| i.instance_id.as_str()).collect()
}

#[tokio::test]
async fn test_failing_probe_hides_instance_until_recovery() {
    let backend = common::start_programmable_backend(200).await;
    let dead = common::closed_addr();

    let registry = Arc::new(ServiceRegistry::new(
        Arc::new(MemoryStore::new()),
        &DiscoveryConfig::default(),
    ));
    registry.register("files", backend.instance("files", "a")).await;
    registry
        .register(
            "files",
            ServiceInstance::new("files", "b", dead.ip().to_string(), dead.port()),
        )
        .await;

    let monitor = HealthMonitor::http(registry.clone(), probe_config());

    let summary = monitor.check_all().await;
    assert_eq!(summary, CheckSummary { healthy: 1, unhealthy: 1 });
    assert_eq!(ids(&registry.get_instances("files").await), vec!["a"]);
    assert!(backend.hits() >= 1);

    backend.set_status(503);
    monitor.check_all().await;
    assert!(registry.get_instances("files").await.is_empty());
    // Still known, so it can come back.
    assert_eq!(registry.known_instances().len(), 2);

    backend.set_status(200);
    monitor.check_all().await;
    assert_eq!(ids(&registry.get_instances("files").await), vec!["a"]);
}

#[tokio::test]
async fn test_healthy_probe_refreshes_store_record() {
    let backend = common::start_programmable_backend(200).await;
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(ServiceRegistry::new(store.clone(), &DiscoveryConfig::default()));
    registry.register("files", backend.instance("files", "a")).await;

    let before = registry.get_instances("files").await[0].last_health_check;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    HealthMonitor::http(registry.clone(), probe_config())
        .check_all()
        .await;

    let records = store.scan_prefix("service:files:").await.unwrap();
    assert_eq!(records.len(), 1);
    let stored: ServiceInstance = serde_json::from_str(&records[0]).unwrap();
    assert!(stored.healthy);
    assert!(stored.last_health_check > before);
}

#[tokio::test]
async fn test_static_instances_are_probed() {
    let backend = common::start_programmable_backend(500).await;

    let mut services = HashMap::new();
    services.insert(
        "files".to_string(),
        vec![StaticInstanceConfig {
            id: "static-1".into(),
            host: backend.addr.ip().to_string(),
            port: backend.addr.port(),
            metadata: Default::default(),
        }],
    );
    let config = DiscoveryConfig {
        services,
        ..Default::default()
    };

    let registry = Arc::new(ServiceRegistry::new(Arc::new(MemoryStore::new()), &config));
    assert_eq!(registry.load_static(), 1);
    assert_eq!(registry.get_instances("files").await.len(), 1);

    HealthMonitor::http(registry.clone(), probe_config())
        .check_all()
        .await;

    // The in-memory view now answers, carrying the failed probe.
    assert!(registry.get_instances("files").await.is_empty());
}

#[tokio::test]
async fn test_static_only_instance_is_checked_without_seeding() {
    let backend = common::start_programmable_backend(500).await;

    let mut services = HashMap::new();
    services.insert(
        "files".to_string(),
        vec![StaticInstanceConfig {
            id: "static-1".into(),
            host: backend.addr.ip().to_string(),
            port: backend.addr.port(),
            metadata: Default::default(),
        }],
    );
    let config = DiscoveryConfig {
        services,
        ..Default::default()
    };

    // Reachable store: nothing is copied into memory.
    let registry = Arc::new(ServiceRegistry::new(Arc::new(MemoryStore::new()), &config));
    assert!(registry.bootstrap().await);
    assert!(registry.known_instances().is_empty());

    let monitor = HealthMonitor::http(registry.clone(), probe_config());
    let summary = monitor.check_all().await;
    assert_eq!(summary, CheckSummary { healthy: 0, unhealthy: 1 });
    assert!(backend.hits() >= 1);
    assert!(registry.get_instances("files").await.is_empty());

    backend.set_status(200);
    monitor.check_all().await;
    assert_eq!(ids(&registry.get_instances("files").await), vec!["static-1"]);
}
