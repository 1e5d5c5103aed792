//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Record storage (sharded in-memory map, optional Redis)
//! - Sweep sampling (random coin flip)

pub mod clock;
pub mod sampler;
pub mod storage;

#[cfg(feature = "redis-storage")]
pub mod redis_storage;

/// Mock implementations for testing.
///
/// Only available with the `test-helpers` feature or in test builds.
///
/// ```toml
/// [dev-dependencies]
/// family-board = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
