//! API gateway routing core: service discovery, load balancing and
//! per-instance circuit breaking.

pub mod admin;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;
pub mod upstream;

pub use config::GatewayConfig;
pub use discovery::{ServiceInstance, ServiceRegistry};
pub use error::{CallError, CircuitOpenError, RoutingError, UpstreamError};
pub use lifecycle::Shutdown;
pub use load_balancer::{LoadBalancer, Strategy};
pub use resilience::{CircuitBreaker, CircuitBreakerRegistry, CircuitState, TargetKey};
pub use upstream::Upstream;
