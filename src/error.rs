//! Error taxonomy for the routing core.
//!
//! Discovery-scoped failures (`RoutingError`) and call-scoped failures
//! (`CircuitOpenError`) are definitive and propagate to the caller.
//! Store failures (`StoreError`) are absorbed by the registry.

use thiserror::Error;

/// Definitive routing failures surfaced by `LoadBalancer::get_instance`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// Discovery returned zero healthy instances.
    #[error("no healthy instances available for service '{service}'")]
    NoHealthyInstances { service: String },

    /// Every healthy instance has an OPEN breaker.
    #[error("all {count} healthy instances of service '{service}' are circuit broken")]
    AllInstancesCircuitBroken { service: String, count: usize },
}

impl RoutingError {
    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            RoutingError::NoHealthyInstances { .. } => "no_healthy_instances",
            RoutingError::AllInstancesCircuitBroken { .. } => "all_circuits_open",
        }
    }
}

/// A call was rejected by its breaker without running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("circuit open for '{target}'")]
pub struct CircuitOpenError {
    /// Breaker key (`service:instance`).
    pub target: String,
    /// Milliseconds until the breaker admits a trial call, when known.
    pub retry_after_ms: Option<u64>,
}

/// Outcome of `CircuitBreaker::execute` when it does not succeed.
#[derive(Debug, Error)]
pub enum CallError<E> {
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    /// The wrapped operation ran and failed.
    #[error("{0}")]
    Operation(E),
}

impl<E> CallError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CallError::Open(_))
    }

    /// Returns the operation's own error, if it ran.
    pub fn into_operation(self) -> Option<E> {
        match self {
            CallError::Operation(e) => Some(e),
            CallError::Open(_) => None,
        }
    }
}

/// Failure of the combined route-and-call helper.
#[derive(Debug, Error)]
pub enum UpstreamError<E> {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("{0}")]
    Call(CallError<E>),
}

/// Errors from the discovery backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store call timed out after {0} ms")]
    Timeout(u64),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid store record: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<etcd_client::Error> for StoreError {
    fn from(e: etcd_client::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Unknown load-balancing strategy name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown load balancing strategy '{0}' (expected round-robin, least-connections, random or weighted)")]
pub struct StrategyParseError(pub String);
