//! Instance selection.
//!
//! # Responsibilities
//! - Resolve a service name to one healthy, non-broken instance
//! - Apply the active strategy
//! - Keep per-instance connection and selection statistics
//!
//! # Design Decisions
//! - Breakers are consulted read-only; an instance without a breaker is Closed
//! - Half-Open instances stay selectable so the trial call can reach them
//! - A single remaining candidate is returned without consulting the strategy

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::discovery::{ServiceInstance, ServiceRegistry};
use crate::error::RoutingError;
use crate::load_balancer::round_robin::RoundRobin;
use crate::load_balancer::stats::{ConnectionGuard, ServiceStats, StatsTable};
use crate::load_balancer::strategy::Strategy;
use crate::load_balancer::{least_conn, random, weighted};
use crate::observability::metrics;
use crate::resilience::{CircuitBreakerRegistry, CircuitState, TargetKey};

pub struct LoadBalancer {
    registry: Arc<ServiceRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    strategy: AtomicU8,
    round_robin: RoundRobin,
    stats: StatsTable,
}

impl LoadBalancer {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        breakers: Arc<CircuitBreakerRegistry>,
        strategy: Strategy,
    ) -> Self {
        Self {
            registry,
            breakers,
            strategy: AtomicU8::new(strategy as u8),
            round_robin: RoundRobin::new(),
            stats: StatsTable::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Pick an instance of `service` to route the next request to.
    pub async fn get_instance(&self, service: &str) -> Result<ServiceInstance, RoutingError> {
        let instances = self.registry.get_instances(service).await;
        if instances.is_empty() {
            let err = RoutingError::NoHealthyInstances {
                service: service.to_string(),
            };
            metrics::record_routing_failure(service, err.reason());
            tracing::warn!(service = %service, "No healthy instances");
            return Err(err);
        }

        let total = instances.len();
        let mut available: Vec<ServiceInstance> = instances
            .into_iter()
            .filter(|instance| {
                let key = TargetKey::new(service, &instance.instance_id);
                self.breakers.state_of(&key) != CircuitState::Open
            })
            .collect();

        if available.is_empty() {
            let err = RoutingError::AllInstancesCircuitBroken {
                service: service.to_string(),
                count: total,
            };
            metrics::record_routing_failure(service, err.reason());
            tracing::warn!(service = %service, count = total, "All instances have open circuits");
            return Err(err);
        }

        let strategy = self.strategy();
        let index = if available.len() == 1 {
            0
        } else {
            self.select(strategy, service, &available)
        };
        let chosen = available.swap_remove(index);

        self.stats.record_selection(&chosen.instance_id);
        metrics::record_selection(service, strategy.as_str());
        tracing::debug!(
            service = %service,
            instance = %chosen.instance_id,
            address = %chosen.address(),
            strategy = %strategy,
            "Instance selected"
        );
        Ok(chosen)
    }

    fn select(&self, strategy: Strategy, service: &str, available: &[ServiceInstance]) -> usize {
        let active = |id: &str| self.stats.active_connections(id);
        let picked = match strategy {
            Strategy::RoundRobin => Some(self.round_robin.next_index(service, available.len())),
            Strategy::LeastConnections => least_conn::pick(available, active),
            Strategy::Random => Some(random::pick(available.len())),
            Strategy::Weighted => {
                let draw: f64 = rand::thread_rng().gen();
                weighted::pick(available, active, draw)
            }
        };
        picked.unwrap_or(0)
    }

    pub fn increment_connections(&self, instance_id: &str) {
        self.stats.increment(instance_id);
    }

    pub fn decrement_connections(&self, instance_id: &str) {
        self.stats.decrement(instance_id);
    }

    /// Count an active connection to `instance_id` for the guard's lifetime.
    pub fn track(&self, instance_id: &str) -> ConnectionGuard {
        self.stats.guard(instance_id)
    }

    pub fn active_connections(&self, instance_id: &str) -> usize {
        self.stats.active_connections(instance_id)
    }

    pub fn strategy(&self) -> Strategy {
        Strategy::from(self.strategy.load(Ordering::Relaxed))
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        let previous = Strategy::from(self.strategy.swap(strategy as u8, Ordering::Relaxed));
        if previous != strategy {
            tracing::info!(from = %previous, to = %strategy, "Load balancing strategy changed");
        }
    }

    pub fn stats(&self) -> BTreeMap<String, ServiceStats> {
        self.stats.snapshot()
    }

    /// Clear statistics for one instance, or everything (rotation counters included).
    pub fn reset_stats(&self, instance_id: Option<&str>) {
        self.stats.reset(instance_id);
        if instance_id.is_none() {
            self.round_robin.reset();
        }
        tracing::info!(instance = ?instance_id, "Load balancer statistics reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::discovery::MemoryStore;

    async fn balancer_with(ids: &[&str], strategy: Strategy) -> LoadBalancer {
        let registry = Arc::new(ServiceRegistry::new(
            Arc::new(MemoryStore::new()),
            &DiscoveryConfig::default(),
        ));
        for (n, id) in ids.iter().enumerate() {
            registry
                .register("files", ServiceInstance::new("files", *id, "10.0.0.1", 8000 + n as u16))
                .await;
        }
        LoadBalancer::new(registry, Arc::new(CircuitBreakerRegistry::default()), strategy)
    }

    async fn pick_ids(balancer: &LoadBalancer, n: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            ids.push(balancer.get_instance("files").await.unwrap().instance_id);
        }
        ids
    }

    #[tokio::test]
    async fn test_no_instances() {
        let balancer = balancer_with(&[], Strategy::RoundRobin).await;
        let err = balancer.get_instance("files").await.unwrap_err();
        assert_eq!(
            err,
            RoutingError::NoHealthyInstances {
                service: "files".into()
            }
        );
    }

    #[tokio::test]
    async fn test_round_robin_cycles_in_id_order() {
        let balancer = balancer_with(&["c", "a", "b"], Strategy::RoundRobin).await;
        assert_eq!(pick_ids(&balancer, 6).await, vec!["a", "b", "c", "a", "b", "c"]);
        assert_eq!(balancer.stats()["a"].total_requests, 2);
    }

    #[tokio::test]
    async fn test_open_breaker_excluded() {
        let balancer = balancer_with(&["a", "b"], Strategy::RoundRobin).await;
        balancer
            .breakers()
            .get_or_create(&TargetKey::new("files", "a"), None)
            .force_open();

        assert_eq!(pick_ids(&balancer, 3).await, vec!["b", "b", "b"]);

        balancer
            .breakers()
            .get_or_create(&TargetKey::new("files", "b"), None)
            .force_half_open();
        assert_eq!(balancer.get_instance("files").await.unwrap().instance_id, "b");
    }

    #[tokio::test]
    async fn test_all_circuits_open() {
        let balancer = balancer_with(&["a", "b"], Strategy::RoundRobin).await;
        for id in ["a", "b"] {
            balancer
                .breakers()
                .get_or_create(&TargetKey::new("files", id), None)
                .force_open();
        }

        let err = balancer.get_instance("files").await.unwrap_err();
        assert_eq!(
            err,
            RoutingError::AllInstancesCircuitBroken {
                service: "files".into(),
                count: 2
            }
        );
    }

    #[tokio::test]
    async fn test_least_connections() {
        let balancer = balancer_with(&["a", "b", "c"], Strategy::LeastConnections).await;
        // All idle: first in id order wins.
        assert_eq!(balancer.get_instance("files").await.unwrap().instance_id, "a");

        balancer.increment_connections("a");
        balancer.increment_connections("a");
        let _b = balancer.track("b");
        assert_eq!(balancer.get_instance("files").await.unwrap().instance_id, "c");

        let _c = balancer.track("c");
        let _c2 = balancer.track("c");
        assert_eq!(balancer.get_instance("files").await.unwrap().instance_id, "b");
    }

    #[tokio::test]
    async fn test_weighted_and_random_stay_in_set() {
        for strategy in [Strategy::Weighted, Strategy::Random] {
            let balancer = balancer_with(&["a", "b"], strategy).await;
            for id in pick_ids(&balancer, 50).await {
                assert!(id == "a" || id == "b");
            }
        }
    }

    #[tokio::test]
    async fn test_single_candidate_short_circuits() {
        let balancer = balancer_with(&["only"], Strategy::Weighted).await;
        assert_eq!(pick_ids(&balancer, 3).await, vec!["only", "only", "only"]);
    }

    #[tokio::test]
    async fn test_connection_counts_floor_at_zero() {
        let balancer = balancer_with(&["a"], Strategy::RoundRobin).await;
        balancer.decrement_connections("a");
        assert_eq!(balancer.active_connections("a"), 0);

        balancer.increment_connections("a");
        assert_eq!(balancer.active_connections("a"), 1);
        balancer.decrement_connections("a");
        balancer.decrement_connections("a");
        assert_eq!(balancer.active_connections("a"), 0);
    }

    #[tokio::test]
    async fn test_strategy_switch_and_reset() {
        let balancer = balancer_with(&["a", "b"], Strategy::RoundRobin).await;
        assert_eq!(pick_ids(&balancer, 1).await, vec!["a"]);

        balancer.set_strategy(Strategy::LeastConnections);
        assert_eq!(balancer.strategy(), Strategy::LeastConnections);

        balancer.set_strategy(Strategy::RoundRobin);
        balancer.reset_stats(None);
        assert!(balancer.stats().is_empty());
        // Rotation restarts from the first instance.
        assert_eq!(pick_ids(&balancer, 1).await, vec!["a"]);
    }
}
