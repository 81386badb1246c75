//! Least Connections load balancing strategy.

use crate::discovery::ServiceInstance;

/// Index of the instance with the fewest active connections.
/// In case of tie, the first one is selected (stability).
pub fn pick(instances: &[ServiceInstance], active: impl Fn(&str) -> usize) -> Option<usize> {
    instances
        .iter()
        .enumerate()
        .min_by_key(|(_, instance)| active(&instance.instance_id))
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn instances() -> Vec<ServiceInstance> {
        vec![
            ServiceInstance::new("files", "a", "10.0.0.1", 80),
            ServiceInstance::new("files", "b", "10.0.0.2", 80),
            ServiceInstance::new("files", "c", "10.0.0.3", 80),
        ]
    }

    #[test]
    fn test_least_conn() {
        let mut conns = HashMap::new();
        conns.insert("a", 3);
        conns.insert("b", 1);
        conns.insert("c", 2);
        let active = |id: &str| conns.get(id).copied().unwrap_or(0);

        assert_eq!(pick(&instances(), active), Some(1));
    }

    #[test]
    fn test_tie_picks_first() {
        assert_eq!(pick(&instances(), |_| 4), Some(0));

        let active = |id: &str| if id == "a" { 2 } else { 1 };
        assert_eq!(pick(&instances(), active), Some(1));
    }

    #[test]
    fn test_empty() {
        assert_eq!(pick(&[], |_| 0), None);
    }
}
