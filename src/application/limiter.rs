//! Fixed-window rate limiter.
//!
//! The limiter counts requests per key in a store behind the `Storage` port
//! and opportunistically sweeps expired records so memory stays bounded
//! without a background timer.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, Storage, SweepSampler};
use crate::domain::window::{LimitError, RateLimitConfig, RateLimitDecision, RateLimitRecord};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::sampler::RandomSampler;
use crate::infrastructure::storage::{InMemoryStore, ShardedStorage};
use std::sync::Arc;
use std::time::Duration;

/// Default chance that a single `check` also runs a sweep.
pub const DEFAULT_SWEEP_PROBABILITY: f64 = 0.01;

/// Error returned when building a `RateLimiter` fails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuildError {
    /// No limit was configured
    MissingLimit,
    /// The configured limit is invalid
    Limit(LimitError),
    /// Sweep probability must lie in `0.0..=1.0`
    InvalidSweepProbability(f64),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::MissingLimit => write!(f, "no rate limit configured"),
            BuildError::Limit(e) => write!(f, "invalid rate limit: {}", e),
            BuildError::InvalidSweepProbability(p) => {
                write!(f, "sweep probability must be within 0.0..=1.0, got {}", p)
            }
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Limit(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LimitError> for BuildError {
    fn from(e: LimitError) -> Self {
        BuildError::Limit(e)
    }
}

/// Counts requests per key within fixed windows.
///
/// Cloning is cheap and every clone shares the same store, clock and
/// metrics, so build one limiter per traffic class at startup and hand
/// clones to request handlers.
///
/// # Example
///
/// ```
/// use family_board::RateLimiter;
/// use std::time::Duration;
///
/// let uploads = RateLimiter::builder()
///     .with_max_requests(10)
///     .with_window(Duration::from_secs(60))
///     .build()
///     .unwrap();
///
/// for _ in 0..10 {
///     assert!(uploads.check("alice@example.com").is_allowed());
/// }
/// let decision = uploads.check("alice@example.com");
/// assert!(decision.retry_after_secs().unwrap() > 0);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter<S = InMemoryStore>
where
    S: Storage<String, RateLimitRecord> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
    sampler: Arc<dyn SweepSampler>,
    config: RateLimitConfig,
    sweep_probability: f64,
    metrics: Metrics,
}

impl RateLimiter<InMemoryStore> {
    /// Start building an in-memory limiter.
    pub fn builder() -> RateLimiterBuilder<InMemoryStore> {
        RateLimiterBuilder::new(Arc::new(ShardedStorage::new()))
    }

    /// In-memory limiter with the system clock and default sweep rate.
    pub fn in_memory(config: RateLimitConfig) -> Self {
        RateLimiter::new(
            Arc::new(ShardedStorage::new()),
            config,
            Arc::new(SystemClock::new()),
        )
    }
}

impl<S> RateLimiter<S>
where
    S: Storage<String, RateLimitRecord> + Clone,
{
    /// Create a limiter over an existing store.
    pub fn new(storage: S, config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            sampler: Arc::new(RandomSampler::new()),
            config,
            sweep_probability: DEFAULT_SWEEP_PROBABILITY,
            metrics: Metrics::new(),
        }
    }

    /// Count a request for `key` and decide whether it may proceed.
    ///
    /// Never fails. An empty key is counted like any other key; normalizing
    /// and validating identities is the caller's job.
    ///
    /// The read-increment-write for one key runs under the store's entry
    /// lock, so concurrent callers sharing a key never lose updates.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let config = self.config;

        let decision = self.storage.with_entry_mut(
            key.to_owned(),
            || RateLimitRecord::new(now, config.window()),
            |record| record.register(now, &config),
        );

        match decision {
            RateLimitDecision::Allowed => {
                self.metrics.record_allowed();
            }
            RateLimitDecision::Limited { retry_after_secs } => {
                self.metrics.record_limited();
                tracing::trace!(key, retry_after_secs, "request limited");
            }
        }

        // Outside the entry lock: retain needs every shard
        if !self.storage.expires_entries() && self.sampler.sample(self.sweep_probability) {
            self.sweep();
        }

        decision
    }

    /// Delete every record whose window has already ended.
    ///
    /// # Returns
    /// The number of records removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut purged = 0usize;

        self.storage.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                purged += 1;
            }
            keep
        });

        self.metrics.record_sweep(purged);
        tracing::debug!(purged, "swept expired rate limit records");
        purged
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.storage.len()
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.storage.clear();
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

/// Builder for constructing a `RateLimiter`.
pub struct RateLimiterBuilder<S> {
    storage: S,
    config: Option<RateLimitConfig>,
    max_requests: Option<u32>,
    window: Duration,
    clock: Option<Arc<dyn Clock>>,
    sampler: Option<Arc<dyn SweepSampler>>,
    sweep_probability: f64,
    metrics: Option<Metrics>,
}

impl<S> RateLimiterBuilder<S>
where
    S: Storage<String, RateLimitRecord> + Clone,
{
    fn new(storage: S) -> Self {
        Self {
            storage,
            config: None,
            max_requests: None,
            window: Duration::from_secs(60),
            clock: None,
            sampler: None,
            sweep_probability: DEFAULT_SWEEP_PROBABILITY,
            metrics: None,
        }
    }

    /// Use a different record store.
    pub fn with_storage<T>(self, storage: T) -> RateLimiterBuilder<T>
    where
        T: Storage<String, RateLimitRecord> + Clone,
    {
        RateLimiterBuilder {
            storage,
            config: self.config,
            max_requests: self.max_requests,
            window: self.window,
            clock: self.clock,
            sampler: self.sampler,
            sweep_probability: self.sweep_probability,
            metrics: self.metrics,
        }
    }

    /// Use an already validated limit. Overrides `with_max_requests` and
    /// `with_window`.
    pub fn with_config(mut self, config: RateLimitConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Requests allowed per window. Validated when `build()` is called.
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = Some(max_requests);
        self
    }

    /// Window length. Default: 60 seconds.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set a custom sweep sampler (mainly for testing).
    pub fn with_sampler(mut self, sampler: Arc<dyn SweepSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Chance that any one `check` also sweeps expired records.
    ///
    /// `0.0` disables opportunistic sweeps. Default: 0.01.
    pub fn with_sweep_probability(mut self, probability: f64) -> Self {
        self.sweep_probability = probability;
        self
    }

    /// Report into an existing metrics handle.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the limiter.
    ///
    /// # Errors
    /// Returns `BuildError` if no limit is set, the limit is invalid, or the
    /// sweep probability is outside `0.0..=1.0`.
    pub fn build(self) -> Result<RateLimiter<S>, BuildError> {
        let config = match (self.config, self.max_requests) {
            (Some(config), _) => config,
            (None, Some(max)) => RateLimitConfig::new(max, self.window)?,
            (None, None) => return Err(BuildError::MissingLimit),
        };

        if !(0.0..=1.0).contains(&self.sweep_probability) {
            return Err(BuildError::InvalidSweepProbability(self.sweep_probability));
        }

        Ok(RateLimiter {
            storage: self.storage,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            sampler: self
                .sampler
                .unwrap_or_else(|| Arc::new(RandomSampler::new())),
            config,
            sweep_probability: self.sweep_probability,
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::{FixedSampler, MockCaptureLayer, MockClock};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::thread;
    use tracing_subscriber::layer::SubscriberExt;

    fn limiter(max: u32, window_secs: u64, clock: &MockClock) -> RateLimiter {
        RateLimiter::builder()
            .with_max_requests(max)
            .with_window(Duration::from_secs(window_secs))
            .with_clock(Arc::new(clock.clone()))
            .with_sampler(Arc::new(FixedSampler::never()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_allows_up_to_max_then_limits() {
        let clock = MockClock::starting_now();
        let limiter = limiter(5, 60, &clock);

        for _ in 0..5 {
            assert_eq!(limiter.check("alice"), RateLimitDecision::Allowed);
        }

        let decision = limiter.check("alice");
        assert_eq!(
            decision,
            RateLimitDecision::Limited {
                retry_after_secs: 60
            }
        );
    }

    #[test]
    fn test_retry_after_counts_down() {
        let clock = MockClock::starting_now();
        let limiter = limiter(1, 60, &clock);

        limiter.check("alice");
        clock.advance(Duration::from_millis(45_200));

        assert_eq!(limiter.check("alice").retry_after_secs(), Some(15));
    }

    #[test]
    fn test_window_expiry_resets_count() {
        let clock = MockClock::starting_now();
        let limiter = limiter(2, 60, &clock);

        limiter.check("alice");
        limiter.check("alice");
        assert!(limiter.check("alice").is_limited());

        // Still inside the window at exactly reset_at
        clock.advance(Duration::from_secs(60));
        assert!(limiter.check("alice").is_limited());

        clock.advance(Duration::from_millis(1));
        assert!(limiter.check("alice").is_allowed());

        let record = limiter.storage().get("alice").unwrap();
        assert_eq!(record.count(), 1);
        assert_eq!(record.reset_at(), clock.now() + Duration::from_secs(60));
    }

    #[test]
    fn test_keys_are_independent() {
        let clock = MockClock::starting_now();
        let limiter = limiter(1, 60, &clock);

        assert!(limiter.check("alice").is_allowed());
        assert!(limiter.check("bob").is_allowed());
        assert!(limiter.check("alice").is_limited());
        assert!(limiter.check("bob").is_limited());
        assert!(limiter.check("carol").is_allowed());
    }

    #[test]
    fn test_empty_key_is_a_normal_bucket() {
        let clock = MockClock::starting_now();
        let limiter = limiter(1, 60, &clock);

        assert!(limiter.check("").is_allowed());
        assert!(limiter.check("").is_limited());
        assert!(limiter.check("alice").is_allowed());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let clock = MockClock::starting_now();
        let limiter = limiter(10, 60, &clock);

        limiter.check("old-1");
        limiter.check("old-2");
        clock.advance(Duration::from_secs(30));
        limiter.check("fresh");
        clock.advance(Duration::from_secs(31));

        assert_eq!(limiter.tracked_keys(), 3);
        assert_eq!(limiter.sweep(), 2);
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.metrics().records_purged(), 2);
        assert_eq!(limiter.metrics().sweeps_run(), 1);
    }

    #[test]
    fn test_check_sweeps_when_sampled() {
        let clock = MockClock::starting_now();
        let limiter = RateLimiter::builder()
            .with_max_requests(10)
            .with_clock(Arc::new(clock.clone()))
            .with_sampler(Arc::new(FixedSampler::always()))
            .build()
            .unwrap();

        limiter.check("a");
        limiter.check("b");
        clock.advance(Duration::from_secs(61));

        // The new record for "c" survives; "a" and "b" are purged
        assert!(limiter.check("c").is_allowed());
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.metrics().records_purged(), 2);
    }

    #[test]
    fn test_metrics_track_decisions() {
        let clock = MockClock::starting_now();
        let limiter = limiter(2, 60, &clock);

        for _ in 0..5 {
            limiter.check("alice");
        }

        let snapshot = limiter.metrics().snapshot();
        assert_eq!(snapshot.requests_allowed, 2);
        assert_eq!(snapshot.requests_limited, 3);
    }

    #[test]
    fn test_concurrent_same_key_exact_count() {
        let limiter = RateLimiter::builder()
            .with_max_requests(50)
            .with_window(Duration::from_secs(3600))
            .with_sampler(Arc::new(FixedSampler::never()))
            .build()
            .unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.check("shared").is_allowed())
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(allowed, 50);
        assert_eq!(limiter.metrics().requests_limited(), 150);
    }

    #[test]
    fn test_concurrent_checks_with_sweeps() {
        let limiter = RateLimiter::builder()
            .with_max_requests(1_000)
            .with_sampler(Arc::new(FixedSampler::always()))
            .build()
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let limiter = limiter.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        assert!(limiter.check(&format!("user-{}-{}", t, i % 5)).is_allowed());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(limiter.tracked_keys(), 20);
    }

    #[test]
    fn test_sweep_logs_purged_count() {
        let capture = MockCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let clock = MockClock::starting_now();
        let limiter = limiter(1, 1, &clock);

        tracing::subscriber::with_default(subscriber, || {
            limiter.check("alice");
            clock.advance(Duration::from_secs(2));
            limiter.sweep();
        });

        let sweeps = capture.with_message("swept expired rate limit records");
        assert_eq!(sweeps.len(), 1);
        assert_eq!(sweeps[0].field("purged"), Some("1"));
    }

    /// In-memory store that counts `len` calls and can claim to expire
    /// entries on its own.
    #[derive(Debug, Clone)]
    struct CountingStore {
        inner: InMemoryStore,
        len_calls: Arc<AtomicUsize>,
        self_expiring: bool,
    }

    impl CountingStore {
        fn new(self_expiring: bool) -> Self {
            Self {
                inner: Arc::new(ShardedStorage::new()),
                len_calls: Arc::new(AtomicUsize::new(0)),
                self_expiring,
            }
        }

        fn len_calls(&self) -> usize {
            self.len_calls.load(AtomicOrdering::SeqCst)
        }
    }

    impl Storage<String, RateLimitRecord> for CountingStore {
        fn with_entry_mut<F, R>(
            &self,
            key: String,
            factory: impl FnOnce() -> RateLimitRecord,
            accessor: F,
        ) -> R
        where
            F: FnOnce(&mut RateLimitRecord) -> R,
        {
            self.inner.with_entry_mut(key, factory, accessor)
        }

        fn len(&self) -> usize {
            self.len_calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.inner.len()
        }

        fn is_empty(&self) -> bool {
            self.inner.is_empty()
        }

        fn clear(&self) {
            self.inner.clear()
        }

        fn retain<F>(&self, f: F)
        where
            F: FnMut(&String, &mut RateLimitRecord) -> bool,
        {
            self.inner.retain(f)
        }

        fn expires_entries(&self) -> bool {
            self.self_expiring
        }
    }

    fn counting_limiter(store: &CountingStore, clock: &MockClock) -> RateLimiter<CountingStore> {
        RateLimiter::builder()
            .with_storage(store.clone())
            .with_max_requests(5)
            .with_window(Duration::from_secs(1))
            .with_clock(Arc::new(clock.clone()))
            .with_sampler(Arc::new(FixedSampler::always()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_sweep_does_not_count_the_whole_store() {
        let store = CountingStore::new(false);
        let clock = MockClock::starting_now();
        let limiter = counting_limiter(&store, &clock);

        limiter.check("alice");
        clock.advance(Duration::from_secs(2));
        assert_eq!(limiter.sweep(), 1);

        assert_eq!(store.len_calls(), 0);
    }

    #[test]
    fn test_self_expiring_store_skips_opportunistic_sweeps() {
        let store = CountingStore::new(true);
        let clock = MockClock::starting_now();
        let limiter = counting_limiter(&store, &clock);

        limiter.check("alice");
        clock.advance(Duration::from_secs(2));
        limiter.check("bob");

        // The sampler always fires, yet check never swept
        assert_eq!(limiter.metrics().sweeps_run(), 0);
        assert_eq!(store.inner.len(), 2);

        // Explicit sweeps still work
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.metrics().sweeps_run(), 1);
    }

    #[test]
    fn test_builder_validation() {
        assert_eq!(
            RateLimiter::builder().build().unwrap_err(),
            BuildError::MissingLimit
        );
        assert_eq!(
            RateLimiter::builder()
                .with_max_requests(0)
                .build()
                .unwrap_err(),
            BuildError::Limit(LimitError::ZeroMaxRequests)
        );
        assert_eq!(
            RateLimiter::builder()
                .with_max_requests(1)
                .with_window(Duration::ZERO)
                .build()
                .unwrap_err(),
            BuildError::Limit(LimitError::ZeroWindow)
        );
        assert_eq!(
            RateLimiter::builder()
                .with_max_requests(1)
                .with_window(Duration::MAX)
                .build()
                .unwrap_err(),
            BuildError::Limit(LimitError::WindowTooLong(Duration::MAX))
        );
        assert!(matches!(
            RateLimiter::builder()
                .with_max_requests(1)
                .with_sweep_probability(1.5)
                .build(),
            Err(BuildError::InvalidSweepProbability(_))
        ));
    }

    #[test]
    fn test_with_config_overrides_fields() {
        let config = RateLimitConfig::per_minute(30).unwrap();
        let limiter = RateLimiter::builder()
            .with_max_requests(1)
            .with_config(config)
            .build()
            .unwrap();

        assert_eq!(limiter.config().max_requests(), 30);
    }

    #[test]
    fn test_shared_store_across_limiters() {
        let store: InMemoryStore = Arc::new(ShardedStorage::new());
        let clock = Arc::new(MockClock::starting_now());
        let reads = RateLimiter::new(
            store.clone(),
            RateLimitConfig::per_minute(100).unwrap(),
            clock.clone(),
        );
        let writes = RateLimiter::new(store, RateLimitConfig::per_minute(30).unwrap(), clock);

        reads.check("general:alice");
        writes.check("write:alice");

        assert_eq!(reads.tracked_keys(), 2);
        assert_eq!(writes.tracked_keys(), 2);
    }
}
