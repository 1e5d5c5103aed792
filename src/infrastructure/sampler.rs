//! Random adapter for the `SweepSampler` port.

use crate::application::ports::SweepSampler;
use rand::Rng;

/// Coin flip backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSampler;

impl RandomSampler {
    pub fn new() -> Self {
        Self
    }
}

impl SweepSampler for RandomSampler {
    fn sample(&self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        rand::rng().random_bool(probability)
    }
}
