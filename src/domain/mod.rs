//! Domain layer - pure logic with no I/O.
//!
//! - Fixed-window counting for a single key
//! - Score events and direction rules
//! - Per-category rankings
//! - Placement-point standings
//!
//! Everything here is deterministic given its inputs, including the time
//! passed in by the caller.

pub mod ranking;
pub mod score;
pub mod standings;
pub mod window;
