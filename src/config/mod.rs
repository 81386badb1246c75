//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → strategy and static fallback instances swapped in place
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Unknown strategy names are rejected at load time, never per request

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::AdminConfig;
pub use schema::CircuitBreakerConfig;
pub use schema::CircuitBreakerOverride;
pub use schema::CircuitBreakerSettings;
pub use schema::DiscoveryConfig;
pub use schema::GatewayConfig;
pub use schema::HealthCheckConfig;
pub use schema::LoadBalancerConfig;
pub use schema::ObservabilityConfig;
pub use schema::StaticInstanceConfig;
pub use schema::StoreConfig;
pub use schema::StoreKind;
