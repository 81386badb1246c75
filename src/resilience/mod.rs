//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an upstream instance:
//!     → registry.rs (breaker for (service, instance), created on first use)
//!     → circuit_breaker.rs (admit or fail fast, record outcome, trip/recover)
//! ```
//!
//! # Design Decisions
//! - Circuit breaker prevents cascading failures
//! - Breakers are never garbage-collected individually; the population is
//!   bounded by the known instances
//! - Registries are passed explicitly, never reached through globals

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use registry::{CircuitBreakerRegistry, TargetKey};
