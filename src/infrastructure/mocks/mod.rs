//! Test doubles for infrastructure adapters.

pub mod clock;
pub mod layer;
pub mod sampler;

pub use clock::MockClock;
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use sampler::FixedSampler;
