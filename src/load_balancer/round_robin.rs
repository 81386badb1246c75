//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

/// Per-service rotation counters.
///
/// Each call takes a distinct pre-increment value, so concurrent callers
/// never share a slot.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counters: DashMap<String, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index into a list of `len` instances (`len > 0`).
    pub fn next_index(&self, service: &str, len: usize) -> usize {
        let ticket = match self.counters.get(service) {
            Some(counter) => counter.fetch_add(1, Ordering::Relaxed),
            None => self
                .counters
                .entry(service.to_string())
                .or_default()
                .fetch_add(1, Ordering::Relaxed),
        };
        ticket % len
    }

    pub fn reset(&self) {
        self.counters.clear();
    }
}
