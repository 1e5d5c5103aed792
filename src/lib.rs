//! # family-board
//!
//! Request throttling and leaderboard aggregation for a small family web
//! service.
//!
//! Two independent pieces live here:
//!
//! - A **fixed-window rate limiter** keyed by caller identity. Each traffic
//!   class (general reads, writes, uploads) has its own ceiling. Limited
//!   requests carry a whole-second retry hint for a `Retry-After` header.
//! - **Leaderboard aggregation**: best score per player per category, and
//!   overall standings from placement points.
//!
//! ## Quick Start
//!
//! ```rust
//! use family_board::{RateLimiterSet, TrafficClass};
//!
//! // 100/min general, 30/min writes, 10/min uploads
//! let limits = RateLimiterSet::default();
//!
//! let decision = limits.check(TrafficClass::Write, "alice@example.com");
//! if let Some(secs) = decision.retry_after_secs() {
//!     // respond 429 with `Retry-After: {secs}`
//!     println!("slow down, retry in {secs}s");
//! }
//! ```
//!
//! ```rust
//! use family_board::{Leaderboard, Player, Roster, ScoreDirection, ScoreEvent};
//!
//! let board = Leaderboard::new(Roster::new(vec![
//!     Player::new("mom", "Mom"),
//!     Player::new("kid", "Kid"),
//! ]));
//!
//! let events = vec![
//!     ScoreEvent::new("1", "mom", "5k", 1_560.0, ScoreDirection::LowerBetter),
//!     ScoreEvent::new("2", "kid", "5k", 1_500.0, ScoreDirection::LowerBetter),
//! ];
//!
//! let view = board.view(&events);
//! assert_eq!(view.categories["5k"].leader().unwrap().user_id(), "kid");
//! assert_eq!(view.standings[0].user_id, "kid");
//! assert_eq!(view.standings[0].points, 4);
//! ```
//!
//! ## Windows
//!
//! A window opens on the first request for a key and lasts for the
//! configured duration. Up to `max_requests` are allowed inside it; later
//! requests are limited and not counted. A request arriving strictly after
//! the window end starts a new window at count 1.
//!
//! ## Memory
//!
//! Records for idle keys are removed by a sweep. Each `check` runs one with
//! a small probability (1% by default) unless the store expires records on
//! its own, and `sweep()` can be called directly. With the `async` feature,
//! `spawn_sweeper` runs it on an interval instead.
//!
//! ## Storage
//!
//! Records live in a sharded in-memory map by default. Enable
//! `redis-storage` to share counters between instances through Redis.
//!
//! ## Observability
//!
//! The crate emits `tracing` events (limited requests at `trace`, sweeps
//! and leaderboard builds at `debug`, storage failures at `warn`) and never
//! installs a subscriber. Every limiter also keeps atomic counters:
//!
//! ```rust
//! # use family_board::RateLimiter;
//! let limiter = RateLimiter::builder().with_max_requests(1).build().unwrap();
//! limiter.check("alice");
//! limiter.check("alice");
//!
//! let snapshot = limiter.metrics().snapshot();
//! assert_eq!(snapshot.requests_allowed, 1);
//! assert_eq!(snapshot.requests_limited, 1);
//! ```

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    ranking::{best_scores_by_category, RankedList},
    score::{ScoreDirection, ScoreEvent},
    standings::{
        overall_standings, PlacementPoints, Player, PlayerStanding, PointsError, Roster,
    },
    window::{LimitError, RateLimitConfig, RateLimitDecision, RateLimitRecord},
};

pub use application::{
    classes::{LimitsConfig, RateLimiterSet, TrafficClass},
    leaderboard::{Leaderboard, LeaderboardView},
    limiter::{BuildError, RateLimiter, RateLimiterBuilder, DEFAULT_SWEEP_PROBABILITY},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, Storage, SweepSampler},
};

#[cfg(feature = "async")]
pub use application::sweeper::{spawn_sweeper, ShutdownError, SweeperConfigError, SweeperHandle};

pub use infrastructure::{
    clock::SystemClock,
    sampler::RandomSampler,
    storage::{InMemoryStore, ShardedStorage},
};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_storage::{RedisStorage, RedisStorageConfig};
