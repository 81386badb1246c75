//! Uniform random load balancing strategy.

use rand::Rng;

/// Uniform index into a list of `len` instances (`len > 0`).
pub fn pick(len: usize) -> usize {
    rand::thread_rng().gen_range(0..len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_covers_all() {
        let mut seen = [false; 3];
        for _ in 0..1000 {
            seen[pick(3)] = true;
        }
        assert!(seen.iter().all(|s| *s));
        assert_eq!(pick(1), 0);
    }
}
