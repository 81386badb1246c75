//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe every known instance concurrently (probe.rs)
//!     → ServiceRegistry::record_probe
//!         - healthy: flag set, lease refreshed
//!         - failing: flag cleared, lease left to expire
//! ```
//!
//! # Design Decisions
//! - Each probe is bounded by its own timeout so one hanging instance
//!   never delays the others
//! - Instances are never removed on failure; they recover on the next
//!   successful probe
//! - The prober is a trait so tests can script outcomes

pub mod active;
pub mod probe;

pub use active::{CheckSummary, HealthMonitor};
pub use probe::{HttpProber, Prober};
