//! Administrative HTTP surface.
//!
//! # Responsibilities
//! - Aggregate health endpoint for load balancers and orchestrators
//! - Instance registration and removal
//! - Breaker inspection and manual overrides
//! - Strategy switching and statistics
//!
//! # Design Decisions
//! - `/health` is unauthenticated; everything under `/admin` requires the bearer key
//! - Handlers only call into the shared registries, they hold no state of their own

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::require_api_key;
use self::handlers::*;
use crate::discovery::ServiceRegistry;
use crate::load_balancer::LoadBalancer;
use crate::resilience::CircuitBreakerRegistry;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared handles for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<ServiceRegistry>,
    pub balancer: Arc<LoadBalancer>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

impl AdminState {
    pub fn new(balancer: Arc<LoadBalancer>, api_key: &str) -> Self {
        Self {
            registry: balancer.registry().clone(),
            breakers: balancer.breakers().clone(),
            balancer,
            api_key: Arc::from(api_key),
            started_at: Instant::now(),
        }
    }
}

#[allow(deprecated)]
pub fn admin_router(state: AdminState) -> Router {
    let protected = Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/services", get(list_services))
        .route("/admin/services/{service}/instances", post(register_instance))
        .route(
            "/admin/services/{service}/instances/{id}",
            delete(deregister_instance),
        )
        .route("/admin/route/{service}", get(route_service))
        .route("/admin/breakers", get(list_breakers))
        .route("/admin/breakers/open", get(list_open_breakers))
        .route("/admin/breakers/{action}", post(bulk_breaker_action))
        .route(
            "/admin/breakers/{service}/{instance}/{action}",
            post(breaker_action),
        )
        .route("/admin/strategy", get(get_strategy).put(put_strategy))
        .route("/admin/stats", get(get_stats).delete(reset_stats))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(get_health))
        .merge(protected)
        .with_state(state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin router until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin server starting");

    axum::serve(listener, admin_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Admin server stopped");
    Ok(())
}
