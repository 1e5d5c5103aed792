//! Deterministic sweep sampler for tests.

use crate::application::ports::SweepSampler;

/// Sampler that ignores the probability and always answers the same.
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler {
    answer: bool,
}

impl FixedSampler {
    /// Sweep on every call.
    pub fn always() -> Self {
        Self { answer: true }
    }

    /// Never sweep from `check`; only explicit sweeps run.
    pub fn never() -> Self {
        Self { answer: false }
    }
}

impl SweepSampler for FixedSampler {
    fn sample(&self, _probability: f64) -> bool {
        self.answer
    }
}
