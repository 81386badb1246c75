//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway
//! routing core. All types derive Serde traits for deserialization from
//! config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::load_balancer::Strategy;

/// Root configuration for the routing core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Service discovery and backing store settings.
    pub discovery: DiscoveryConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Load balancing settings.
    pub load_balancer: LoadBalancerConfig,

    /// Circuit breaker defaults and per-service overrides.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Which backing store holds the TTL registration records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Etcd,
}

/// Backing store connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,

    /// Store endpoints (e.g., "http://127.0.0.1:2379").
    pub endpoints: Vec<String>,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            endpoints: Vec::new(),
            connect_timeout_ms: 2000,
        }
    }
}

/// Service discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub store: StoreConfig,

    /// Lease of a registration record in seconds.
    pub instance_ttl_secs: u64,

    /// Upper bound for a single store call in milliseconds.
    pub store_timeout_ms: u64,

    /// Static fallback instances keyed by service name.
    pub services: HashMap<String, Vec<StaticInstanceConfig>>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            instance_ttl_secs: 60,
            store_timeout_ms: 2000,
            services: HashMap::new(),
        }
    }
}

/// One operator-supplied instance.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StaticInstanceConfig {
    /// Instance identifier, unique per service.
    pub id: String,

    pub host: String,

    pub port: u16,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the background health-check loop.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Probe timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            path: "/health".to_string(),
        }
    }
}

/// Load balancing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Selection strategy; unknown names fail deserialization.
    pub strategy: Strategy,
}

/// Circuit breaker configuration for one target.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures within the epoch that trip the breaker.
    pub failure_threshold: u32,

    /// Time spent OPEN before a trial call is admitted.
    pub reset_timeout_ms: u64,

    /// Failure ratio (0..=1) that trips the breaker.
    pub expected_error_rate: f64,

    /// Calls required before the trip condition is evaluated.
    pub minimum_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            expected_error_rate: 0.5,
            minimum_requests: 10,
        }
    }
}

/// Partial breaker configuration merged over the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct CircuitBreakerOverride {
    pub failure_threshold: Option<u32>,
    pub reset_timeout_ms: Option<u64>,
    pub expected_error_rate: Option<f64>,
    pub minimum_requests: Option<u32>,
}

impl CircuitBreakerOverride {
    /// Apply the set fields on top of `base`.
    pub fn merge_over(&self, base: &CircuitBreakerConfig) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            reset_timeout_ms: self.reset_timeout_ms.unwrap_or(base.reset_timeout_ms),
            expected_error_rate: self.expected_error_rate.unwrap_or(base.expected_error_rate),
            minimum_requests: self.minimum_requests.unwrap_or(base.minimum_requests),
        }
    }
}

/// Breaker defaults plus per-service overrides.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    #[serde(flatten)]
    pub defaults: CircuitBreakerConfig,

    /// Overrides keyed by service name.
    pub overrides: HashMap<String, CircuitBreakerOverride>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
