//! Periodic cleanup of expired limiter records.
//!
//! Opportunistic sweeps from `check` are enough for most deployments. Long
//! idle periods leave expired records in place until the next request, so
//! services that prefer a steady memory profile can also run this task.

use crate::application::limiter::RateLimiter;
use crate::application::ports::Storage;
use crate::domain::window::RateLimitRecord;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Error returned when sweeper configuration is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweeperConfigError {
    /// Sweep interval must be greater than zero
    ZeroInterval,
}

impl std::fmt::Display for SweeperConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweeperConfigError::ZeroInterval => write!(f, "sweep interval must be greater than 0"),
        }
    }
}

impl std::error::Error for SweeperConfigError {}

/// Error returned when shutting the sweeper down fails.
#[derive(Debug)]
pub enum ShutdownError {
    /// The sweeper task panicked
    TaskPanicked,
    /// The sweeper task was cancelled before it could stop cleanly
    TaskCancelled,
}

impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownError::TaskPanicked => write!(f, "sweeper task panicked"),
            ShutdownError::TaskCancelled => write!(f, "sweeper task was cancelled"),
        }
    }
}

impl std::error::Error for ShutdownError {}

/// Handle to a running sweeper task.
///
/// Dropping the handle leaves the task running; call
/// [`shutdown`](Self::shutdown) to stop it.
#[derive(Debug)]
pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the task to stop and wait for it.
    ///
    /// # Errors
    /// Returns `ShutdownError` if the task panicked or was aborted.
    pub async fn shutdown(self) -> Result<(), ShutdownError> {
        // The receiver only disappears once the task has already exited
        let _ = self.stop.send(true);
        self.task.await.map_err(|e| {
            if e.is_panic() {
                ShutdownError::TaskPanicked
            } else {
                ShutdownError::TaskCancelled
            }
        })
    }

    /// Check whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn a task that sweeps `limiter` every `interval`.
///
/// Must be called inside a tokio runtime.
///
/// # Errors
/// Returns `SweeperConfigError::ZeroInterval` if `interval` is zero.
pub fn spawn_sweeper<S>(
    limiter: RateLimiter<S>,
    interval: Duration,
) -> Result<SweeperHandle, SweeperConfigError>
where
    S: Storage<String, RateLimitRecord> + Clone + 'static,
{
    if interval.is_zero() {
        return Err(SweeperConfigError::ZeroInterval);
    }

    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    limiter.sweep();
                }
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        tracing::debug!("rate limit sweeper stopped");
                        break;
                    }
                }
            }
        }
    });

    Ok(SweeperHandle { stop, task })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::{FixedSampler, MockClock};
    use std::sync::Arc;

    fn limiter(clock: &MockClock) -> RateLimiter {
        RateLimiter::builder()
            .with_max_requests(5)
            .with_window(Duration::from_secs(1))
            .with_clock(Arc::new(clock.clone()))
            .with_sampler(Arc::new(FixedSampler::never()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let clock = MockClock::starting_now();
        assert_eq!(
            spawn_sweeper(limiter(&clock), Duration::ZERO).unwrap_err(),
            SweeperConfigError::ZeroInterval
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_on_interval() {
        let clock = MockClock::starting_now();
        let limiter = limiter(&clock);
        limiter.check("alice");
        limiter.check("bob");
        clock.advance(Duration::from_secs(2));

        let handle = spawn_sweeper(limiter.clone(), Duration::from_secs(10)).unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(limiter.tracked_keys(), 0);
        assert!(limiter.metrics().sweeps_run() >= 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let clock = MockClock::starting_now();
        let handle = spawn_sweeper(limiter(&clock), Duration::from_millis(20)).unwrap();

        assert!(!handle.is_finished());
        assert!(handle.shutdown().await.is_ok());
    }
}
