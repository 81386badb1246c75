//! Reachability probes.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::discovery::ServiceInstance;

/// Decides whether an instance is reachable.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, instance: &ServiceInstance) -> bool;
}

/// `GET http://host:port<path>`; any 2xx is healthy.
pub struct HttpProber {
    client: Client<HttpConnector, Body>,
    path: String,
}

impl HttpProber {
    pub fn new(path: impl Into<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            path: path.into(),
        }
    }

    fn probe_url(&self, instance: &ServiceInstance) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{}", instance.address()))?.join(&self.path)
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, instance: &ServiceInstance) -> bool {
        let url = match self.probe_url(instance) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(instance = %instance.instance_id, error = %e, "Invalid probe address");
                return false;
            }
        };

        let request = match Request::builder()
            .method("GET")
            .uri(url.as_str())
            .header("user-agent", "gateway-router-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!("Failed to build health check request: {}", e);
                return false;
            }
        };

        match self.client.request(request).await {
            Ok(response) => {
                let success = response.status().is_success();
                if !success {
                    tracing::debug!(
                        instance = %instance.instance_id,
                        url = %url,
                        status = %response.status(),
                        "Health check failed: non-success status"
                    );
                }
                success
            }
            Err(e) => {
                tracing::debug!(
                    instance = %instance.instance_id,
                    url = %url,
                    error = %e,
                    "Health check failed: connection error"
                );
                false
            }
        }
    }
}
