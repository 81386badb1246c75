//! Service instance records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::clock::unix_millis;

/// Prefix of every registration record in the backing store.
pub const RECORD_PREFIX: &str = "service";

/// One network-addressable backend process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_name: String,
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub healthy: bool,
    /// Milliseconds since the Unix epoch of the last probe (or registration).
    pub last_health_check: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    /// Create a healthy instance.
    pub fn new(
        service_name: impl Into<String>,
        instance_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            instance_id: instance_id.into(),
            host: host.into(),
            port,
            healthy: true,
            last_health_check: unix_millis(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `host:port`, suitable for building upstream URLs.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Key of this instance's TTL record.
    pub fn record_key(&self) -> String {
        record_key(&self.service_name, &self.instance_id)
    }
}

/// `service:<name>:<instanceId>`
pub fn record_key(service: &str, instance_id: &str) -> String {
    format!("{}:{}:{}", RECORD_PREFIX, service, instance_id)
}

/// Prefix matching every record of `service`.
pub fn service_prefix(service: &str) -> String {
    format!("{}:{}:", RECORD_PREFIX, service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keys() {
        let instance = ServiceInstance::new("files", "files-1", "10.0.0.1", 8000);
        assert_eq!(instance.record_key(), "service:files:files-1");
        assert!(instance.record_key().starts_with(&service_prefix("files")));
        assert_eq!(instance.address(), "10.0.0.1:8000");
        assert!(instance.healthy);
    }

    #[test]
    fn test_record_json_shape() {
        let instance = ServiceInstance::new("files", "files-1", "10.0.0.1", 8000);
        let json = serde_json::to_value(&instance).unwrap();
        assert_eq!(json["instance_id"], "files-1");
        assert!(json.get("metadata").is_none());

        let tagged = instance.with_metadata("zone", "a");
        let json = serde_json::to_string(&tagged).unwrap();
        let back: ServiceInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata["zone"], "a");
    }
}
