//! Bounded randomness for pacing delays.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Produces samples in `[-1.0, 1.0]`.
pub trait Jitter: Send + Sync {
    fn sample(&self) -> f64;
}

/// Always zero: pacing becomes fully deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn sample(&self) -> f64 {
        0.0
    }
}

/// Pseudo-random samples seeded from the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockJitter;

impl Jitter for ClockJitter {
    fn sample(&self) -> f64 {
        rand_factor() * 2.0 - 1.0
    }
}

/// Pseudo-random factor in `[0, 1)`.
fn rand_factor() -> f64 {
    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);

    let hash = hasher.finish();
    (hash % 10000) as f64 / 10000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_jitter_stays_in_range() {
        for _ in 0..100 {
            let sample = ClockJitter.sample();
            assert!((-1.0..=1.0).contains(&sample), "sample {sample}");
        }
    }
}
