//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! register / deregister
//!     → registry.rs (in-memory view, always updated)
//!     → store.rs / etcd.rs (TTL record, best effort)
//!
//! get_instances(service)
//!     → source.rs fallback chain: store → memory → static
//!     → overlay local health observations
//!     → healthy instances only, ascending instance id
//! ```
//!
//! # Design Decisions
//! - The backing store is optional for routing: every failure degrades to
//!   in-memory or static data instead of propagating
//! - Health flags are owned by the local health-check loop
//! - Records expire from the store unless a successful probe refreshes them

pub mod etcd;
pub mod instance;
pub mod registry;
pub mod source;
pub mod store;

pub use instance::ServiceInstance;
pub use registry::ServiceRegistry;
pub use store::{KvStore, MemoryStore};
