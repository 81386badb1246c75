//! Configuration file watcher for hot reload.
//!
//! Only the load-balancing strategy and the static fallback instances are
//! applied at runtime; other sections need a restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;
use crate::discovery::ServiceRegistry;
use crate::load_balancer::LoadBalancer;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(
                                    "Failed to reload config: {}. Keeping current configuration.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply the hot-reloadable parts of a new configuration.
pub fn apply_update(config: &GatewayConfig, registry: &ServiceRegistry, balancer: &LoadBalancer) {
    let strategy = config.load_balancer.strategy;
    if balancer.strategy() != strategy {
        balancer.set_strategy(strategy);
    }
    registry.replace_static(&config.discovery.services);
    tracing::info!(
        strategy = %strategy,
        static_services = config.discovery.services.len(),
        "Configuration update applied"
    );
}

/// Consume configuration updates until shutdown.
pub async fn apply_updates(
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    registry: Arc<ServiceRegistry>,
    balancer: Arc<LoadBalancer>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => apply_update(&config, &registry, &balancer),
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!("Config update loop stopped");
}
