//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_instance_health` (gauge): 1=healthy, 0=unhealthy
//! - `gateway_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_breaker_rejections_total` (counter): calls rejected while open
//! - `gateway_selections_total` (counter): instances handed out, by strategy
//! - `gateway_routing_failures_total` (counter): by reason
//! - `gateway_discovery_fallback_total` (counter): failed or empty discovery sources
//! - `gateway_store_errors_total` (counter): backing store write/delete failures

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_instance_health(service: &str, instance_id: &str, healthy: bool) {
    gauge!(
        "gateway_instance_health",
        "service" => service.to_string(),
        "instance" => instance_id.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_breaker_state(target: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("gateway_breaker_state", "target" => target.to_string()).set(value);
}

pub fn record_breaker_rejection(target: &str) {
    counter!("gateway_breaker_rejections_total", "target" => target.to_string()).increment(1);
}

pub fn record_selection(service: &str, strategy: &'static str) {
    counter!(
        "gateway_selections_total",
        "service" => service.to_string(),
        "strategy" => strategy
    )
    .increment(1);
}

pub fn record_routing_failure(service: &str, reason: &'static str) {
    counter!(
        "gateway_routing_failures_total",
        "service" => service.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_discovery_fallback(source: &'static str) {
    counter!("gateway_discovery_fallback_total", "source" => source).increment(1);
}

pub fn record_store_error(operation: &'static str) {
    counter!("gateway_store_errors_total", "operation" => operation).increment(1);
}
