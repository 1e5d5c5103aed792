//! Fixed-window request counting.
//!
//! A window opens on the first request for a key and lasts for a fixed
//! duration. Requests inside the window are counted against a ceiling; once
//! the window has elapsed the next request opens a fresh one.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Longest window a configuration accepts.
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Error returned when a rate limit configuration is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitError {
    /// `max_requests` must be greater than zero
    ZeroMaxRequests,
    /// The window duration must be greater than zero
    ZeroWindow,
    /// The window is longer than [`MAX_WINDOW`]
    WindowTooLong(Duration),
}

impl std::fmt::Display for LimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitError::ZeroMaxRequests => write!(f, "max_requests must be greater than 0"),
            LimitError::ZeroWindow => write!(f, "window must be greater than 0"),
            LimitError::WindowTooLong(window) => write!(
                f,
                "window of {}s exceeds the maximum of {}s",
                window.as_secs(),
                MAX_WINDOW.as_secs()
            ),
        }
    }
}

impl std::error::Error for LimitError {}

/// Ceiling and window length for one traffic class.
///
/// Deserializes from `{ "max_requests": 30, "window_ms": 60000 }` and rejects
/// zero values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLimit", into = "RawLimit")]
pub struct RateLimitConfig {
    max_requests: u32,
    window: Duration,
}

impl RateLimitConfig {
    /// Create a configuration allowing `max_requests` per `window`.
    ///
    /// # Errors
    /// Returns `LimitError` if either value is zero or the window is longer
    /// than [`MAX_WINDOW`].
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, LimitError> {
        if max_requests == 0 {
            return Err(LimitError::ZeroMaxRequests);
        }
        if window.is_zero() {
            return Err(LimitError::ZeroWindow);
        }
        if window > MAX_WINDOW {
            return Err(LimitError::WindowTooLong(window));
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    /// `max_requests` per minute.
    ///
    /// # Errors
    /// Returns `LimitError::ZeroMaxRequests` if `max_requests` is zero.
    pub fn per_minute(max_requests: u32) -> Result<Self, LimitError> {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Built-in presets; both arguments must be non-zero.
    pub(crate) const fn preset(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Maximum requests counted in one window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Length of one window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

#[derive(Serialize, Deserialize)]
struct RawLimit {
    max_requests: u32,
    window_ms: u64,
}

impl TryFrom<RawLimit> for RateLimitConfig {
    type Error = LimitError;

    fn try_from(raw: RawLimit) -> Result<Self, Self::Error> {
        RateLimitConfig::new(raw.max_requests, Duration::from_millis(raw.window_ms))
    }
}

impl From<RateLimitConfig> for RawLimit {
    fn from(config: RateLimitConfig) -> Self {
        RawLimit {
            max_requests: config.max_requests,
            window_ms: config.window.as_millis().try_into().unwrap_or(u64::MAX),
        }
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RateLimitDecision {
    /// The request fits in the current window
    Allowed,
    /// The window is full; retry once it resets
    Limited {
        /// Whole seconds until the window resets, rounded up and never zero
        retry_after_secs: u64,
    },
}

impl RateLimitDecision {
    /// Check if the request was allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }

    /// Check if the request was limited.
    pub fn is_limited(&self) -> bool {
        matches!(self, RateLimitDecision::Limited { .. })
    }

    /// Seconds until the caller may retry, suitable for a `Retry-After` header.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            RateLimitDecision::Allowed => None,
            RateLimitDecision::Limited { retry_after_secs } => Some(*retry_after_secs),
        }
    }

    /// Same as [`retry_after_secs`](Self::retry_after_secs) as a `Duration`.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_secs().map(Duration::from_secs)
    }
}

/// Counter state for one key.
///
/// The key itself lives in the storage that owns the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    count: u32,
    reset_at: Instant,
}

impl RateLimitRecord {
    /// A window opened at `now` with nothing counted yet.
    pub fn new(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: instant_after(now, window),
        }
    }

    /// Rebuild a record from persisted parts.
    pub fn from_parts(count: u32, reset_at: Instant) -> Self {
        Self { count, reset_at }
    }

    /// Requests counted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// When the current window ends.
    pub fn reset_at(&self) -> Instant {
        self.reset_at
    }

    /// A window is only over once `now` is strictly past `reset_at`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.reset_at
    }

    /// Count one request at `now` and decide whether it fits.
    pub fn register(&mut self, now: Instant, config: &RateLimitConfig) -> RateLimitDecision {
        if self.is_expired(now) {
            self.count = 1;
            self.reset_at = instant_after(now, config.window);
            return RateLimitDecision::Allowed;
        }

        if self.count < config.max_requests {
            self.count += 1;
            RateLimitDecision::Allowed
        } else {
            RateLimitDecision::Limited {
                retry_after_secs: ceil_secs(self.reset_at.saturating_duration_since(now)),
            }
        }
    }
}

/// `now + span`, saturating instead of panicking when the platform's
/// `Instant` cannot represent the sum.
pub(crate) fn instant_after(now: Instant, span: Duration) -> Instant {
    now.checked_add(span)
        .or_else(|| now.checked_add(MAX_WINDOW))
        .unwrap_or(now)
}

fn ceil_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}
