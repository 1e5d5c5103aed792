//! Hand-stepped clock for tests.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Clock that only moves when told to.
///
/// Clones share the same time, so a test can keep one handle and give the
/// other to a limiter.
///
/// ```ignore
/// use family_board::infrastructure::mocks::MockClock;
/// use family_board::application::ports::Clock;
/// use std::time::Duration;
///
/// let clock = MockClock::starting_now();
/// let start = clock.now();
///
/// clock.advance(Duration::from_secs(61));
/// assert_eq!(clock.now(), start + Duration::from_secs(61));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<Instant>>,
}

impl MockClock {
    /// Create a mock clock frozen at `start`.
    pub fn new(start: Instant) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Create a mock clock frozen at the current instant.
    pub fn starting_now() -> Self {
        Self::new(Instant::now())
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        *self.lock() += by;
    }

    /// Move time forward by whole milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Jump to a specific instant.
    pub fn set(&self, instant: Instant) {
        *self.lock() = instant;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Instant> {
        self.current
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.lock()
    }
}
