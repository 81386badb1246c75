//! Circuit breaker registry.
//!
//! One breaker per `(service, instance)` target, created lazily with the
//! process-wide defaults (merged with per-service and per-call overrides).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::{CircuitBreakerConfig, CircuitBreakerOverride, CircuitBreakerSettings};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};

/// Breaker key: one upstream instance of one service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetKey {
    pub service: String,
    pub instance_id: String,
}

impl TargetKey {
    pub fn new(service: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            instance_id: instance_id.into(),
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.instance_id)
    }
}

#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    service_overrides: HashMap<String, CircuitBreakerOverride>,
    breakers: DashMap<TargetKey, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            service_overrides: HashMap::new(),
            breakers: DashMap::new(),
        }
    }

    pub fn from_settings(settings: &CircuitBreakerSettings) -> Self {
        Self {
            defaults: settings.defaults,
            service_overrides: settings.overrides.clone(),
            breakers: DashMap::new(),
        }
    }

    pub fn defaults(&self) -> &CircuitBreakerConfig {
        &self.defaults
    }

    /// Existing breaker for `key`, or a new one configured from the defaults,
    /// the service override and `config_override` (in increasing precedence).
    ///
    /// The override only applies when the breaker is created.
    pub fn get_or_create(
        &self,
        key: &TargetKey,
        config_override: Option<&CircuitBreakerOverride>,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(key) {
            return existing.clone();
        }

        self.breakers
            .entry(key.clone())
            .or_insert_with(|| {
                let mut config = self.defaults;
                if let Some(service) = self.service_overrides.get(&key.service) {
                    config = service.merge_over(&config);
                }
                if let Some(call) = config_override {
                    config = call.merge_over(&config);
                }
                tracing::debug!(target_key = %key, ?config, "Circuit breaker created");
                Arc::new(CircuitBreaker::new(key.to_string(), config))
            })
            .clone()
    }

    /// Lookup without creating.
    pub fn get(&self, key: &TargetKey) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(key).map(|b| b.clone())
    }

    /// State of `key`; an absent breaker counts as Closed.
    pub fn state_of(&self, key: &TargetKey) -> CircuitState {
        self.get(key).map(|b| b.state()).unwrap_or(CircuitState::Closed)
    }

    /// Targets whose breaker is Closed or Half-Open.
    pub fn healthy_targets(&self) -> Vec<TargetKey> {
        self.targets_where(|state| state != CircuitState::Open)
    }

    /// Targets whose breaker is Open.
    pub fn unhealthy_targets(&self) -> Vec<TargetKey> {
        self.targets_where(|state| state == CircuitState::Open)
    }

    pub fn all_stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self.snapshot().into_iter().map(|(_, b)| b.stats()).collect();
        stats.sort_by(|a, b| a.target.cmp(&b.target));
        stats
    }

    pub fn force_open_all(&self) {
        for (_, breaker) in self.snapshot() {
            breaker.force_open();
        }
    }

    pub fn force_close_all(&self) {
        for (_, breaker) in self.snapshot() {
            breaker.force_close();
        }
    }

    /// Drop every breaker; targets start over from a fresh Closed breaker on next use.
    pub fn reset_all(&self) {
        let count = self.breakers.len();
        self.force_close_all();
        self.breakers.clear();
        tracing::info!(count, "Circuit breakers reset");
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn targets_where(&self, predicate: impl Fn(CircuitState) -> bool) -> Vec<TargetKey> {
        let mut targets: Vec<TargetKey> = self
            .snapshot()
            .into_iter()
            .filter(|(_, b)| predicate(b.state()))
            .map(|(k, _)| k)
            .collect();
        targets.sort();
        targets
    }

    /// Clone out the entries so breaker locks are never taken under a map shard lock.
    fn snapshot(&self) -> Vec<(TargetKey, Arc<CircuitBreaker>)> {
        self.breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
