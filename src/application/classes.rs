//! Traffic classes and the per-class limiter set.
//!
//! Each class has its own ceiling. All classes can share one record store;
//! keys are namespaced by class so counters never collide.

use crate::application::limiter::RateLimiter;
use crate::application::ports::{Clock, Storage};
use crate::domain::window::{RateLimitConfig, RateLimitDecision, RateLimitRecord};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::storage::{InMemoryStore, ShardedStorage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of request being limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficClass {
    /// Reads and other cheap calls
    General,
    /// Score submissions, polls, wishlist edits
    Write,
    /// File and photo uploads
    Upload,
}

impl TrafficClass {
    pub const ALL: [TrafficClass; 3] = [
        TrafficClass::General,
        TrafficClass::Write,
        TrafficClass::Upload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficClass::General => "general",
            TrafficClass::Write => "write",
            TrafficClass::Upload => "upload",
        }
    }

    /// Storage key for an identity in this class.
    pub fn key_for(&self, identity: &str) -> String {
        format!("{}:{}", self.as_str(), identity)
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ceilings for every traffic class.
///
/// Defaults to 100, 30 and 10 requests per minute for general, write and
/// upload traffic. Missing classes in a config file fall back to those
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub general: RateLimitConfig,
    pub write: RateLimitConfig,
    pub upload: RateLimitConfig,
}

impl LimitsConfig {
    pub fn for_class(&self, class: TrafficClass) -> RateLimitConfig {
        match class {
            TrafficClass::General => self.general,
            TrafficClass::Write => self.write,
            TrafficClass::Upload => self.upload,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            general: RateLimitConfig::preset(100, 60),
            write: RateLimitConfig::preset(30, 60),
            upload: RateLimitConfig::preset(10, 60),
        }
    }
}

/// One limiter per traffic class, constructed once and shared by handle.
///
/// Clones share state, so this can sit in application state and be cloned
/// into every handler.
#[derive(Debug, Clone)]
pub struct RateLimiterSet<S = InMemoryStore>
where
    S: Storage<String, RateLimitRecord> + Clone,
{
    general: RateLimiter<S>,
    write: RateLimiter<S>,
    upload: RateLimiter<S>,
}

impl RateLimiterSet<InMemoryStore> {
    /// In-memory limiters sharing one store and the system clock.
    pub fn in_memory(config: &LimitsConfig) -> Self {
        Self::with_storage(
            Arc::new(ShardedStorage::new()),
            config,
            Arc::new(SystemClock::new()),
        )
    }
}

impl Default for RateLimiterSet<InMemoryStore> {
    fn default() -> Self {
        Self::in_memory(&LimitsConfig::default())
    }
}

impl<S> RateLimiterSet<S>
where
    S: Storage<String, RateLimitRecord> + Clone,
{
    /// Build all classes over one shared store.
    pub fn with_storage(storage: S, config: &LimitsConfig, clock: Arc<dyn Clock>) -> Self {
        let make =
            |class| RateLimiter::new(storage.clone(), config.for_class(class), clock.clone());
        Self {
            general: make(TrafficClass::General),
            write: make(TrafficClass::Write),
            upload: make(TrafficClass::Upload),
        }
    }

    /// Assemble a set from limiters built elsewhere.
    pub fn from_limiters(
        general: RateLimiter<S>,
        write: RateLimiter<S>,
        upload: RateLimiter<S>,
    ) -> Self {
        Self {
            general,
            write,
            upload,
        }
    }

    /// Count a request by `identity` in `class`.
    pub fn check(&self, class: TrafficClass, identity: &str) -> RateLimitDecision {
        let decision = self.limiter(class).check(&class.key_for(identity));
        if decision.is_limited() {
            tracing::debug!(
                class = class.as_str(),
                identity,
                retry_after_secs = ?decision.retry_after_secs(),
                "rate limit reached"
            );
        }
        decision
    }

    pub fn limiter(&self, class: TrafficClass) -> &RateLimiter<S> {
        match class {
            TrafficClass::General => &self.general,
            TrafficClass::Write => &self.write,
            TrafficClass::Upload => &self.upload,
        }
    }
}
