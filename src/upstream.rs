//! Route-and-call helper for the proxy layer.
//!
//! # Data Flow
//! ```text
//! call(service, op)
//!     → LoadBalancer::get_instance
//!     → connection guard (active connections +1 until the call settles)
//!     → breaker for (service, instance), created on first use
//!     → CircuitBreaker::execute(op(instance))
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::discovery::ServiceInstance;
use crate::error::UpstreamError;
use crate::load_balancer::LoadBalancer;
use crate::resilience::TargetKey;

#[derive(Clone)]
pub struct Upstream {
    balancer: Arc<LoadBalancer>,
}

impl Upstream {
    pub fn new(balancer: Arc<LoadBalancer>) -> Self {
        Self { balancer }
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    /// Select an instance of `service` and run `operation` against it under
    /// that instance's breaker. Transport failures returned by `operation`
    /// feed the breaker.
    pub async fn call<T, E, F, Fut>(&self, service: &str, operation: F) -> Result<T, UpstreamError<E>>
    where
        F: FnOnce(ServiceInstance) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let instance = self.balancer.get_instance(service).await?;
        let _connection = self.balancer.track(&instance.instance_id);

        let key = TargetKey::new(service, &instance.instance_id);
        let breaker = self.balancer.breakers().get_or_create(&key, None);

        breaker
            .execute(|| operation(instance))
            .await
            .map_err(UpstreamError::Call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, DiscoveryConfig};
    use crate::discovery::{MemoryStore, ServiceRegistry};
    use crate::error::RoutingError;
    use crate::load_balancer::Strategy;
    use crate::resilience::{CircuitBreakerRegistry, CircuitState};

    async fn upstream(ids: &[&str]) -> Upstream {
        let registry = Arc::new(ServiceRegistry::new(
            Arc::new(MemoryStore::new()),
            &DiscoveryConfig::default(),
        ));
        for id in ids {
            registry
                .register("files", ServiceInstance::new("files", *id, "10.0.0.1", 80))
                .await;
        }
        let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 2,
            minimum_requests: 2,
            ..Default::default()
        }));
        Upstream::new(Arc::new(LoadBalancer::new(registry, breakers, Strategy::RoundRobin)))
    }

    #[tokio::test]
    async fn test_call_reaches_selected_instance() {
        let upstream = upstream(&["a"]).await;
        let balancer = upstream.balancer().clone();

        let address = upstream
            .call("files", |instance| async move {
                assert_eq!(balancer.active_connections(&instance.instance_id), 1);
                Ok::<_, String>(instance.address())
            })
            .await
            .unwrap();

        assert_eq!(address, "10.0.0.1:80");
        assert_eq!(upstream.balancer().active_connections("a"), 0);
    }

    #[tokio::test]
    async fn test_failures_trip_breaker_and_reroute() {
        let upstream = upstream(&["a", "b"]).await;

        // Round-robin alternates a, b, a, b; only "a" fails.
        for _ in 0..4 {
            let _ = upstream
                .call("files", |instance| async move {
                    if instance.instance_id == "a" {
                        Err("connection reset".to_string())
                    } else {
                        Ok(())
                    }
                })
                .await;
        }

        let breakers = upstream.balancer().breakers();
        assert_eq!(breakers.state_of(&TargetKey::new("files", "a")), CircuitState::Open);
        assert_eq!(breakers.state_of(&TargetKey::new("files", "b")), CircuitState::Closed);

        for _ in 0..4 {
            let id = upstream
                .call("files", |instance| async move { Ok::<_, String>(instance.instance_id) })
                .await
                .unwrap();
            assert_eq!(id, "b");
        }
    }

    #[tokio::test]
    async fn test_routing_error_propagates() {
        let upstream = upstream(&[]).await;
        let err = upstream
            .call("files", |_| async { Ok::<_, String>(()) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::Routing(RoutingError::NoHealthyInstances { .. })
        ));
    }
}
