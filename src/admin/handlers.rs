use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AdminState;
use crate::discovery::ServiceInstance;
use crate::error::RoutingError;
use crate::load_balancer::{ServiceStats, Strategy};
use crate::resilience::{CircuitBreakerStats, TargetKey};

/// Error body returned by admin handlers.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(RoutingError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody { error: msg.clone(), reason: None },
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody { error: msg.clone(), reason: None },
            ),
            ApiError::Unavailable(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    error: err.to_string(),
                    reason: Some(err.reason()),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    /// Healthy instance count per known service.
    pub services: BTreeMap<String, usize>,
    pub open_breakers: usize,
}

pub async fn get_health(State(state): State<AdminState>) -> (StatusCode, Json<HealthReport>) {
    let snapshot = state.registry.get_healthy_snapshot().await;
    let services: BTreeMap<String, usize> = snapshot
        .into_iter()
        .map(|(name, instances)| (name, instances.len()))
        .collect();

    let healthy = services.values().any(|count| *count > 0);
    let report = HealthReport {
        status: if healthy { "healthy" } else { "unhealthy" },
        services,
        open_breakers: state.breakers.unhealthy_targets().len(),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub strategy: Strategy,
    pub known_instances: usize,
    pub breakers: usize,
    pub open_breakers: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        strategy: state.balancer.strategy(),
        known_instances: state.registry.known_instances().len(),
        breakers: state.breakers.len(),
        open_breakers: state.breakers.unhealthy_targets().len(),
    })
}

pub async fn list_services(
    State(state): State<AdminState>,
) -> Json<BTreeMap<String, Vec<ServiceInstance>>> {
    Json(state.registry.get_healthy_snapshot().await)
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub id: Option<String>,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

pub async fn register_instance(
    State(state): State<AdminState>,
    Path(service): Path<String>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ServiceInstance>), ApiError> {
    if body.host.trim().is_empty() {
        return Err(ApiError::BadRequest("host must not be empty".into()));
    }
    if body.port == 0 {
        return Err(ApiError::BadRequest("port must be non-zero".into()));
    }

    let id = match body.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => uuid::Uuid::new_v4().to_string(),
    };
    let mut instance = ServiceInstance::new(&service, id, body.host, body.port);
    instance.metadata = body.metadata;

    state.registry.register(&service, instance.clone()).await;
    Ok((StatusCode::CREATED, Json(instance)))
}

pub async fn deregister_instance(
    State(state): State<AdminState>,
    Path((service, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    if state.registry.deregister(&service, &id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "instance '{}' of service '{}' is not registered",
            id, service
        )))
    }
}

/// Run one selection exactly as the proxy would.
pub async fn route_service(
    State(state): State<AdminState>,
    Path(service): Path<String>,
) -> Result<Json<ServiceInstance>, ApiError> {
    state
        .balancer
        .get_instance(&service)
        .await
        .map(Json)
        .map_err(ApiError::Unavailable)
}

pub async fn list_breakers(State(state): State<AdminState>) -> Json<Vec<CircuitBreakerStats>> {
    Json(state.breakers.all_stats())
}

pub async fn list_open_breakers(State(state): State<AdminState>) -> Json<Vec<TargetKey>> {
    Json(state.breakers.unhealthy_targets())
}

pub async fn breaker_action(
    State(state): State<AdminState>,
    Path((service, instance, action)): Path<(String, String, String)>,
) -> Result<Json<CircuitBreakerStats>, ApiError> {
    let key = TargetKey::new(service.clone(), instance.clone());
    let breaker = match state.breakers.get(&key) {
        Some(breaker) => breaker,
        None => {
            if !state.registry.is_known(&service, &instance).await {
                return Err(ApiError::NotFound(format!(
                    "no instance '{}' registered for service '{}'",
                    instance, service
                )));
            }
            state.breakers.get_or_create(&key, None)
        }
    };

    match action.as_str() {
        "open" => breaker.force_open(),
        "close" => breaker.force_close(),
        "half-open" => breaker.force_half_open(),
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown breaker action '{}' (expected open, close or half-open)",
                other
            )))
        }
    }
    Ok(Json(breaker.stats()))
}

#[derive(Serialize)]
pub struct BulkActionResult {
    pub action: String,
    pub breakers: usize,
}

pub async fn bulk_breaker_action(
    State(state): State<AdminState>,
    Path(action): Path<String>,
) -> Result<Json<BulkActionResult>, ApiError> {
    let breakers = state.breakers.len();
    match action.as_str() {
        "open-all" => state.breakers.force_open_all(),
        "close-all" => state.breakers.force_close_all(),
        "reset" => state.breakers.reset_all(),
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown breaker action '{}' (expected open-all, close-all or reset)",
                other
            )))
        }
    }
    Ok(Json(BulkActionResult { action, breakers }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StrategyBody {
    pub strategy: String,
}

pub async fn get_strategy(State(state): State<AdminState>) -> Json<StrategyBody> {
    Json(StrategyBody {
        strategy: state.balancer.strategy().to_string(),
    })
}

pub async fn put_strategy(
    State(state): State<AdminState>,
    Json(body): Json<StrategyBody>,
) -> Result<Json<StrategyBody>, ApiError> {
    let strategy: Strategy = body
        .strategy
        .parse()
        .map_err(|e: crate::error::StrategyParseError| ApiError::BadRequest(e.to_string()))?;
    state.balancer.set_strategy(strategy);
    Ok(Json(StrategyBody {
        strategy: strategy.to_string(),
    }))
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<BTreeMap<String, ServiceStats>> {
    Json(state.balancer.stats())
}

#[derive(Debug, Deserialize)]
pub struct ResetQuery {
    pub instance: Option<String>,
}

pub async fn reset_stats(
    State(state): State<AdminState>,
    Query(query): Query<ResetQuery>,
) -> StatusCode {
    state.balancer.reset_stats(query.instance.as_deref());
    StatusCode::NO_CONTENT
}
