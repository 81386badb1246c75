//! Per-instance selection statistics.
//!
//! # Responsibilities
//! - Track active connections (for Least Connections and Weighted)
//! - Count selections and remember when an instance was last chosen
//! - Hand out RAII guards that release a connection on drop

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::clock::unix_millis;

/// Statistics for one instance id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub active_connections: usize,
    pub total_requests: u64,
    /// Epoch milliseconds of the last selection.
    pub last_used: Option<u64>,
}

/// Statistics table keyed by instance id.
#[derive(Debug, Clone, Default)]
pub struct StatsTable {
    inner: Arc<DashMap<String, ServiceStats>>,
}

impl StatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_connections(&self, instance_id: &str) -> usize {
        self.inner
            .get(instance_id)
            .map(|s| s.active_connections)
            .unwrap_or(0)
    }

    pub fn record_selection(&self, instance_id: &str) {
        let mut stats = self.inner.entry(instance_id.to_string()).or_default();
        stats.total_requests += 1;
        stats.last_used = Some(unix_millis());
    }

    pub fn increment(&self, instance_id: &str) {
        self.inner
            .entry(instance_id.to_string())
            .or_default()
            .active_connections += 1;
    }

    /// Never goes below zero.
    pub fn decrement(&self, instance_id: &str) {
        if let Some(mut stats) = self.inner.get_mut(instance_id) {
            stats.active_connections = stats.active_connections.saturating_sub(1);
        }
    }

    /// Count a connection for `instance_id` until the guard is dropped.
    pub fn guard(&self, instance_id: &str) -> ConnectionGuard {
        self.increment(instance_id);
        ConnectionGuard {
            table: self.clone(),
            instance_id: instance_id.to_string(),
        }
    }

    pub fn snapshot(&self) -> std::collections::BTreeMap<String, ServiceStats> {
        self.inner
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Clear one instance's statistics, or all of them.
    pub fn reset(&self, instance_id: Option<&str>) {
        match instance_id {
            Some(id) => {
                self.inner.remove(id);
            }
            None => self.inner.clear(),
        }
    }
}

/// A RAII guard that manages the active connection count.
#[derive(Debug)]
pub struct ConnectionGuard {
    table: StatsTable,
    instance_id: String,
}

impl ConnectionGuard {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.table.decrement(&self.instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decrement_floors_at_zero() {
        let table = StatsTable::new();
        table.decrement("a");
        assert_eq!(table.active_connections("a"), 0);

        table.increment("a");
        table.decrement("a");
        table.decrement("a");
        assert_eq!(table.active_connections("a"), 0);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let table = StatsTable::new();
        {
            let _first = table.guard("a");
            let second = table.guard("a");
            assert_eq!(second.instance_id(), "a");
            assert_eq!(table.active_connections("a"), 2);
        }
        assert_eq!(table.active_connections("a"), 0);
    }

    #[test]
    fn test_selection_and_reset() {
        let table = StatsTable::new();
        table.record_selection("a");
        table.record_selection("a");
        table.record_selection("b");

        let snapshot = table.snapshot();
        assert_eq!(snapshot["a"].total_requests, 2);
        assert!(snapshot["a"].last_used.is_some());

        table.reset(Some("a"));
        assert!(!table.snapshot().contains_key("a"));
        assert_eq!(table.snapshot().len(), 1);

        table.reset(None);
        assert!(table.snapshot().is_empty());
    }
}
