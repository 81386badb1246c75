//! Weighted load balancing strategy.
//!
//! Weight per instance is `max(1, 100 - active_connections)`; one uniform
//! draw in `[0, 1)` scaled to the total weight walks the cumulative weights.

use crate::discovery::ServiceInstance;

const BASE_WEIGHT: usize = 100;

pub fn weight(active_connections: usize) -> usize {
    BASE_WEIGHT.saturating_sub(active_connections).max(1)
}

/// Index chosen by `draw` (`0.0 <= draw < 1.0`); rounding past the end lands on the last instance.
pub fn pick(instances: &[ServiceInstance], active: impl Fn(&str) -> usize, draw: f64) -> Option<usize> {
    if instances.is_empty() {
        return None;
    }

    let weights: Vec<usize> = instances
        .iter()
        .map(|instance| weight(active(&instance.instance_id)))
        .collect();
    let total: usize = weights.iter().sum();
    let target = draw * total as f64;

    let mut cumulative = 0.0;
    for (index, w) in weights.iter().enumerate() {
        cumulative += *w as f64;
        if target < cumulative {
            return Some(index);
        }
    }
    Some(instances.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instances() -> Vec<ServiceInstance> {
        vec![
            ServiceInstance::new("files", "a", "10.0.0.1", 80),
            ServiceInstance::new("files", "b", "10.0.0.2", 80),
        ]
    }

    #[test]
    fn test_weight_formula() {
        assert_eq!(weight(0), 100);
        assert_eq!(weight(40), 60);
        assert_eq!(weight(99), 1);
        assert_eq!(weight(100), 1);
        assert_eq!(weight(250), 1);
    }

    #[test]
    fn test_roulette_boundaries() {
        // a: 100 - 75 = 25, b: 100 → total 125, a owns [0, 25).
        let active = |id: &str| if id == "a" { 75 } else { 0 };
        assert_eq!(pick(&instances(), active, 0.0), Some(0));
        assert_eq!(pick(&instances(), active, 0.19), Some(0));
        assert_eq!(pick(&instances(), active, 0.2), Some(1));
        assert_eq!(pick(&instances(), active, 0.999), Some(1));
    }

    #[test]
    fn test_rounding_falls_back_to_last() {
        assert_eq!(pick(&instances(), |_| 0, 1.0), Some(1));
        assert_eq!(pick(&[], |_| 0, 0.5), None);
    }
}
