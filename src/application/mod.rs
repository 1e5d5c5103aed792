//! Application layer - orchestration of domain logic.
//!
//! - Rate limiter (per-key decisions over a record store)
//! - Traffic classes (one limiter per kind of request)
//! - Leaderboard (rankings and standings for a roster)
//! - Background sweeper (`async` feature)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement, so limiter logic never depends on a concrete
//! clock, store or random source.

pub mod classes;
pub mod leaderboard;
pub mod limiter;
pub mod metrics;
pub mod ports;

#[cfg(feature = "async")]
pub mod sweeper;
