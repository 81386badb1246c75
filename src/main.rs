//! API gateway routing core.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                   GATEWAY ROUTER                      │
//!                 │                                                       │
//!  proxy layer    │  ┌──────────┐    ┌───────────────┐    ┌────────────┐  │
//!  ───────────────┼─▶│ upstream │───▶│ load_balancer │───▶│ discovery  │──┼──▶ etcd / memory
//!                 │  └────┬─────┘    └───────┬───────┘    │  registry  │  │
//!                 │       │                  │            └─────▲──────┘  │
//!                 │       ▼                  ▼                  │         │
//!                 │  ┌──────────────────────────────┐    ┌──────┴──────┐  │
//!                 │  │ resilience (circuit breakers)│    │   health    │──┼──▶ GET /health
//!                 │  └──────────────────────────────┘    │  monitor    │  │    on instances
//!                 │                                      └─────────────┘  │
//!                 │  ┌─────────┐ ┌──────────────┐ ┌───────────┐           │
//!                 │  │ config  │ │observability │ │ lifecycle │  admin ◀──┼── operators
//!                 │  └─────────┘ └──────────────┘ └───────────┘           │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use gateway_router::admin::{self, AdminState};
use gateway_router::config::loader::load_config;
use gateway_router::config::watcher::{apply_updates, ConfigWatcher};
use gateway_router::config::{GatewayConfig, StoreKind};
use gateway_router::discovery::etcd::EtcdStore;
use gateway_router::discovery::{KvStore, MemoryStore, ServiceRegistry};
use gateway_router::health::HealthMonitor;
use gateway_router::lifecycle::Shutdown;
use gateway_router::load_balancer::LoadBalancer;
use gateway_router::observability::{logging, metrics};
use gateway_router::resilience::CircuitBreakerRegistry;

#[derive(Parser)]
#[command(name = "gateway-router")]
#[command(about = "Service discovery, load balancing and circuit breaking for an API gateway", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the strategy and static instances when the file changes.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Misconfiguration is fatal at startup.
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gateway-router starting");
    tracing::info!(
        strategy = %config.load_balancer.strategy,
        store = ?config.discovery.store.kind,
        static_services = config.discovery.services.len(),
        health_interval_secs = config.health_check.interval_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (store, store_connected) = connect_store(&config).await;
    let registry = Arc::new(ServiceRegistry::new(store, &config.discovery));
    if store_connected {
        registry.bootstrap().await;
    } else {
        let seeded = registry.load_static();
        tracing::warn!(seeded, "Discovery store unavailable, routing from static instances");
    }

    let breakers = Arc::new(CircuitBreakerRegistry::from_settings(&config.circuit_breaker));
    let balancer = Arc::new(LoadBalancer::new(
        registry.clone(),
        breakers,
        config.load_balancer.strategy,
    ));

    let shutdown = Arc::new(Shutdown::new());
    let mut tasks = Vec::new();

    tasks.push(HealthMonitor::http(registry.clone(), config.health_check.clone()).spawn(shutdown.subscribe()));

    // Keep the notify watcher alive for the life of the process.
    let _watcher = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => {
                    tasks.push(tokio::spawn(apply_updates(
                        updates,
                        registry.clone(),
                        balancer.clone(),
                        shutdown.subscribe(),
                    )));
                    Some(handle)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start config watcher, hot reload disabled");
                    None
                }
            }
        }
        _ => None,
    };

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(balancer.clone(), &config.admin.api_key);
        let signal = shutdown.signal();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, signal).await {
                tracing::error!(error = %e, "Admin server failed");
            }
        }));
    }

    shutdown.trigger_on_ctrl_c().await;

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Background task panicked");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Connect the configured backing store. An unreachable etcd degrades to an
/// in-memory store; the second value reports whether the configured store is in use.
async fn connect_store(config: &GatewayConfig) -> (Arc<dyn KvStore>, bool) {
    match config.discovery.store.kind {
        StoreKind::Memory => (Arc::new(MemoryStore::new()), true),
        StoreKind::Etcd => match EtcdStore::connect(&config.discovery.store).await {
            Ok(store) => (Arc::new(store), true),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to connect to etcd, using in-memory store");
                (Arc::new(MemoryStore::new()), false)
            }
        },
    }
}
