//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! get_instance(service)
//!     → ServiceRegistry (healthy instances, ascending id)
//!     → CircuitBreakerRegistry (drop instances whose breaker is Open)
//!     → strategy.rs dispatch:
//!         - round_robin.rs (per-service counter)
//!         - least_conn.rs (fewest active connections, first wins ties)
//!         - random.rs (uniform)
//!         - weighted.rs (roulette over max(1, 100 - active))
//!     → stats.rs (total requests, last used)
//! ```
//!
//! # Design Decisions
//! - Strategy is a closed enum dispatched through one function
//! - Strategy is process-wide and switchable at runtime
//! - Only the round-robin counter needs atomic read-modify-write; other
//!   statistics are best effort

pub mod balancer;
pub mod least_conn;
pub mod random;
pub mod round_robin;
pub mod stats;
pub mod strategy;
pub mod weighted;

pub use balancer::LoadBalancer;
pub use stats::{ConnectionGuard, ServiceStats};
pub use strategy::Strategy;
