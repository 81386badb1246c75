//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ratios in range, ports valid)
//! - Detect duplicate static instance ids
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{CircuitBreakerConfig, GatewayConfig, StoreKind};

/// A single semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let health = &config.health_check;
    if health.timeout_secs == 0 {
        errors.push(ValidationError::new("health_check.timeout_secs", "must be greater than 0"));
    }
    if health.timeout_secs >= health.interval_secs {
        errors.push(ValidationError::new(
            "health_check.timeout_secs",
            format!(
                "probe timeout ({}s) must be shorter than the interval ({}s)",
                health.timeout_secs, health.interval_secs
            ),
        ));
    }
    if !health.path.starts_with('/') {
        errors.push(ValidationError::new("health_check.path", "must start with '/'"));
    }

    let discovery = &config.discovery;
    if discovery.store_timeout_ms == 0 {
        errors.push(ValidationError::new("discovery.store_timeout_ms", "must be greater than 0"));
    }
    if discovery.instance_ttl_secs == 0 {
        errors.push(ValidationError::new("discovery.instance_ttl_secs", "must be greater than 0"));
    }
    if discovery.store.kind == StoreKind::Etcd && discovery.store.endpoints.is_empty() {
        errors.push(ValidationError::new(
            "discovery.store.endpoints",
            "etcd store requires at least one endpoint",
        ));
    }

    for (service, instances) in &discovery.services {
        let mut seen = HashSet::new();
        for instance in instances {
            let field = format!("discovery.services.{}", service);
            if instance.id.is_empty() {
                errors.push(ValidationError::new(&field, "instance id must not be empty"));
            } else if !seen.insert(instance.id.as_str()) {
                errors.push(ValidationError::new(
                    &field,
                    format!("duplicate instance id '{}'", instance.id),
                ));
            }
            if instance.port == 0 {
                errors.push(ValidationError::new(
                    &field,
                    format!("instance '{}' has port 0", instance.id),
                ));
            }
        }
    }

    validate_breaker("circuit_breaker", &config.circuit_breaker.defaults, &mut errors);
    for (service, partial) in &config.circuit_breaker.overrides {
        let merged = partial.merge_over(&config.circuit_breaker.defaults);
        validate_breaker(&format!("circuit_breaker.overrides.{}", service), &merged, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_breaker(prefix: &str, config: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if !(0.0..=1.0).contains(&config.expected_error_rate) {
        errors.push(ValidationError::new(
            format!("{}.expected_error_rate", prefix),
            "must be within 0..=1",
        ));
    }
    if config.minimum_requests == 0 {
        errors.push(ValidationError::new(
            format!("{}.minimum_requests", prefix),
            "must be at least 1",
        ));
    }
    if config.reset_timeout_ms == 0 {
        errors.push(ValidationError::new(
            format!("{}.reset_timeout_ms", prefix),
            "must be greater than 0",
        ));
    }
}
