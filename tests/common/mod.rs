//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gateway_router::config::DiscoveryConfig;
use gateway_router::discovery::{MemoryStore, ServiceInstance, ServiceRegistry};
use gateway_router::load_balancer::{LoadBalancer, Strategy};
use gateway_router::resilience::CircuitBreakerRegistry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A mock backend on an ephemeral port whose status code can be changed while running.
pub struct MockBackend {
    pub addr: SocketAddr,
    status: Arc<AtomicU16>,
    hits: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn instance(&self, service: &str, id: &str) -> ServiceInstance {
        ServiceInstance::new(service, id, self.addr.ip().to_string(), self.addr.port())
    }
}

/// Start a programmable mock backend answering every request with the current status.
pub async fn start_programmable_backend(status: u16) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let status = Arc::new(AtomicU16::new(status));
    let hits = Arc::new(AtomicUsize::new(0));

    let (s, h) = (status.clone(), hits.clone());
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let (s, h) = (s.clone(), h.clone());
                    tokio::spawn(async move {
                        // Drain the request head before answering.
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        h.fetch_add(1, Ordering::SeqCst);

                        let status_text = match s.load(Ordering::SeqCst) {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let body = "ok";
                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockBackend { addr, status, hits }
}

/// An address with nothing listening on it.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Registry over an in-memory store with `ids` registered under `service`.
pub async fn registry_with(service: &str, ids: &[&str]) -> Arc<ServiceRegistry> {
    let registry = Arc::new(ServiceRegistry::new(
        Arc::new(MemoryStore::new()),
        &DiscoveryConfig::default(),
    ));
    for (n, id) in ids.iter().enumerate() {
        registry
            .register(
                service,
                ServiceInstance::new(service, *id, "10.0.0.1", 9000 + n as u16),
            )
            .await;
    }
    registry
}

pub async fn balancer_with(service: &str, ids: &[&str], strategy: Strategy) -> Arc<LoadBalancer> {
    let registry = registry_with(service, ids).await;
    Arc::new(LoadBalancer::new(
        registry,
        Arc::new(CircuitBreakerRegistry::default()),
        strategy,
    ))
}
