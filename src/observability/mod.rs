//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (service, instance, state) on every state change
//! - Metrics are cheap (atomic increments behind the `metrics` facade)
//! - Recording without an installed exporter is a no-op

pub mod logging;
pub mod metrics;
