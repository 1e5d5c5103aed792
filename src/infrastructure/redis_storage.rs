//! Redis-backed record store.
//!
//! Lets several application instances share one set of rate limit counters.
//!
//! ## Layout
//!
//! - Keys: the limiter key with a configurable prefix, e.g.
//!   `family-board:ratelimit:upload:alice@example.com`
//! - Values: bincode-encoded count plus the window end as unix milliseconds
//! - TTL: set with `PSETEX` to the remaining window plus a small grace, so
//!   Redis drops idle records on its own
//!
//! `Instant` cannot cross process boundaries, so the window end is stored
//! as wall-clock time and mapped back onto the local monotonic clock on
//! load. Hosts sharing a store need reasonably synchronized clocks.
//!
//! ## Failure behaviour
//!
//! Redis errors are logged at `warn` and never surface to callers. A failed
//! read starts a fresh window and a failed write is dropped, so an outage
//! lets traffic through rather than rejecting it.
//!
//! ## Time
//!
//! Conversions between `Instant` and wall-clock time use the storage's own
//! clock (`SystemClock` unless replaced with [`RedisStorage::with_clock`]).
//! Give the store the same clock as the limiters built on top of it.
//!
//! ## Sweeping
//!
//! Redis drops records through their TTL, so limiters over this store skip
//! opportunistic sweeps. An explicit `sweep()` still works; it scans the
//! prefix once and takes the connection lock one key at a time.
//!
//! ## Runtime
//!
//! The `Storage` port is synchronous. Inside a multi-threaded tokio runtime
//! the adapter blocks with `block_in_place`. Outside a runtime a temporary
//! current-thread runtime is created. Inside a current-thread runtime
//! blocking is impossible, so every call falls back to local state and logs
//! a warning.
//!
//! ## Example
//!
//! ```rust,ignore
//! use family_board::{RateLimitConfig, RateLimiter, RedisStorage, SystemClock};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = RedisStorage::connect("redis://127.0.0.1/").await?;
//!     let uploads = RateLimiter::new(
//!         storage,
//!         RateLimitConfig::per_minute(10)?,
//!         Arc::new(SystemClock::new()),
//!     );
//!     assert!(uploads.check("upload:alice").is_allowed());
//!     Ok(())
//! }
//! ```

use crate::application::ports::{Clock, Storage};
use crate::domain::window::{instant_after, RateLimitRecord, MAX_WINDOW};
use crate::infrastructure::clock::SystemClock;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tokio::sync::Mutex;

const SCAN_BATCH: usize = 100;

/// Configuration for Redis storage.
#[derive(Debug, Clone)]
pub struct RedisStorageConfig {
    /// Prefix for every Redis key (default: "family-board:ratelimit:")
    pub key_prefix: String,
    /// Extra lifetime past the window end before Redis drops a record
    /// (default: 1 second)
    pub expiry_grace: Duration,
}

impl Default for RedisStorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: "family-board:ratelimit:".to_string(),
            expiry_grace: Duration::from_secs(1),
        }
    }
}

/// Wire form of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct StoredRecord {
    count: u32,
    reset_at_ms: u64,
}

impl StoredRecord {
    fn from_record(record: &RateLimitRecord, now: Instant, wall: SystemTime) -> Self {
        let remaining = record.reset_at().saturating_duration_since(now);
        let reset_at_ms = wall
            .checked_add(remaining.min(MAX_WINDOW))
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis().try_into().unwrap_or(u64::MAX))
            .unwrap_or(0);

        Self {
            count: record.count(),
            reset_at_ms,
        }
    }

    fn into_record(self, now: Instant, wall: SystemTime) -> RateLimitRecord {
        let reset_wall = UNIX_EPOCH.checked_add(Duration::from_millis(self.reset_at_ms));
        let reset_at = match reset_wall.map(|w| w.duration_since(wall)) {
            // No window outlives MAX_WINDOW; anything further is corrupt
            Some(Ok(ahead)) => instant_after(now, ahead.min(MAX_WINDOW)),
            // Already in the past; clamp to the oldest instant we can express
            Some(Err(e)) => now.checked_sub(e.duration()).unwrap_or(now),
            None => instant_after(now, MAX_WINDOW),
        };
        RateLimitRecord::from_parts(self.count, reset_at)
    }

    /// Milliseconds until Redis should drop the record.
    fn ttl_ms(&self, wall: SystemTime, grace: Duration) -> u64 {
        let now_ms: u64 = wall
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().try_into().unwrap_or(u64::MAX))
            .unwrap_or(0);
        let grace_ms: u64 = grace.as_millis().try_into().unwrap_or(u64::MAX);

        self.reset_at_ms
            .saturating_sub(now_ms)
            .saturating_add(grace_ms)
            .max(1)
    }
}

/// Redis-backed storage for limiter records shared across instances.
///
/// Must be used from a multi-threaded tokio runtime or from outside any
/// runtime. On a current-thread runtime (including the default
/// `#[tokio::test]` flavor) every operation falls back to local state, so
/// limits are not shared.
pub struct RedisStorage {
    connection: Arc<Mutex<ConnectionManager>>,
    config: RedisStorageConfig,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Clone for RedisStorage {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl RedisStorage {
    /// Connect to Redis with default configuration.
    ///
    /// The returned store blocks on the caller's runtime; see the type docs
    /// for the multi-threaded runtime requirement.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStorageConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStorageConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            config,
            clock: Arc::new(SystemClock::new()),
        })
    }

    /// Use `clock` for `Instant` conversions. Pass the limiter's clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RedisStorageConfig {
        &self.config
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn pattern(&self) -> String {
        format!("{}*", self.config.key_prefix)
    }

    async fn load(
        conn: &mut ConnectionManager,
        redis_key: &str,
        now: Instant,
    ) -> Result<Option<RateLimitRecord>, RedisError> {
        let bytes: Option<Vec<u8>> = conn.get(redis_key).await?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };

        match bincode::deserialize::<StoredRecord>(&bytes) {
            Ok(stored) => Ok(Some(stored.into_record(now, SystemTime::now()))),
            Err(_) => {
                // Unreadable value; start over
                conn.del::<_, ()>(redis_key).await?;
                Ok(None)
            }
        }
    }

    async fn save(
        conn: &mut ConnectionManager,
        redis_key: &str,
        record: &RateLimitRecord,
        now: Instant,
        grace: Duration,
    ) -> Result<(), RedisError> {
        let wall = SystemTime::now();
        let stored = StoredRecord::from_record(record, now, wall);

        match bincode::serialize(&stored) {
            Ok(bytes) => {
                conn.pset_ex::<_, _, ()>(redis_key, bytes, stored.ttl_ms(wall, grace))
                    .await
            }
            Err(e) => {
                tracing::warn!(error = %e, key = redis_key, "failed to encode rate limit record");
                Ok(())
            }
        }
    }

    async fn scan(conn: &mut ConnectionManager, pattern: &str) -> Result<Vec<String>, RedisError> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(conn)
                .await?;

            keys.extend(batch);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }
}

/// Way to drive a future from synchronous code.
enum Bridge {
    Current(Handle),
    Owned(Runtime),
}

impl Bridge {
    fn acquire() -> Option<Self> {
        if let Ok(handle) = Handle::try_current() {
            if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
                tracing::warn!("redis storage needs a multi-threaded runtime; using local state");
                return None;
            }
            return Some(Bridge::Current(handle));
        }

        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => Some(Bridge::Owned(rt)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to start runtime for redis storage");
                None
            }
        }
    }

    fn run<F: Future>(self, fut: F) -> F::Output {
        match self {
            Bridge::Current(handle) => tokio::task::block_in_place(|| handle.block_on(fut)),
            Bridge::Owned(rt) => rt.block_on(fut),
        }
    }
}

impl Storage<String, RateLimitRecord> for RedisStorage {
    /// Load, update and persist one record.
    ///
    /// Within one process the whole get-modify-set runs under an async
    /// mutex. Across processes two instances may race on the same key and
    /// lose an increment; the window still bounds the overshoot.
    fn with_entry_mut<F, R>(
        &self,
        key: String,
        factory: impl FnOnce() -> RateLimitRecord,
        accessor: F,
    ) -> R
    where
        F: FnOnce(&mut RateLimitRecord) -> R,
    {
        let Some(bridge) = Bridge::acquire() else {
            let mut record = factory();
            return accessor(&mut record);
        };

        let redis_key = self.redis_key(&key);
        let grace = self.config.expiry_grace;
        let now = self.clock.now();

        bridge.run(async {
            let mut conn = self.connection.lock().await;

            let mut record = match Self::load(&mut conn, &redis_key, now).await {
                Ok(Some(record)) => record,
                Ok(None) => factory(),
                Err(e) => {
                    tracing::warn!(error = %e, key = %key, "failed to load rate limit record");
                    factory()
                }
            };
            let result = accessor(&mut record);

            if let Err(e) = Self::save(&mut conn, &redis_key, &record, now, grace).await {
                tracing::warn!(error = %e, key = %key, "failed to persist rate limit record");
            }

            result
        })
    }

    /// Number of keys under the prefix. Runs a full `SCAN`.
    fn len(&self) -> usize {
        let Some(bridge) = Bridge::acquire() else {
            return 0;
        };
        let pattern = self.pattern();

        bridge.run(async {
            let mut conn = self.connection.lock().await;
            match Self::scan(&mut conn, &pattern).await {
                Ok(keys) => keys.len(),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to count rate limit records");
                    0
                }
            }
        })
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self) {
        let Some(bridge) = Bridge::acquire() else {
            return;
        };
        let pattern = self.pattern();

        bridge.run(async {
            let mut conn = self.connection.lock().await;
            let keys = match Self::scan(&mut conn, &pattern).await {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to list rate limit records");
                    return;
                }
            };

            for chunk in keys.chunks(SCAN_BATCH) {
                if let Err(e) = conn.del::<_, ()>(chunk).await {
                    tracing::warn!(error = %e, "failed to clear rate limit records");
                }
            }
        });
    }

    fn retain<F>(&self, mut f: F)
    where
        F: FnMut(&String, &mut RateLimitRecord) -> bool,
    {
        let Some(bridge) = Bridge::acquire() else {
            return;
        };
        let pattern = self.pattern();
        let grace = self.config.expiry_grace;
        let now = self.clock.now();

        bridge.run(async {
            let listed = {
                let mut conn = self.connection.lock().await;
                Self::scan(&mut conn, &pattern).await
            };
            let keys = match listed {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to list rate limit records");
                    return;
                }
            };

            for redis_key in keys {
                let Some(key) = redis_key.strip_prefix(&self.config.key_prefix) else {
                    continue;
                };
                let key = key.to_string();

                // Lock per key so concurrent checks interleave with the pass
                let mut conn = self.connection.lock().await;

                // Gone already (TTL) or unreadable
                let Ok(Some(before)) = Self::load(&mut conn, &redis_key, now).await else {
                    continue;
                };

                let mut record = before;
                if !f(&key, &mut record) {
                    if let Err(e) = conn.del::<_, ()>(&redis_key).await {
                        tracing::warn!(error = %e, key = %key, "failed to delete rate limit record");
                    }
                } else if record != before {
                    if let Err(e) = Self::save(&mut conn, &redis_key, &record, now, grace).await {
                        tracing::warn!(error = %e, key = %key, "failed to persist rate limit record");
                    }
                }
            }
        });
    }

    fn expires_entries(&self) -> bool {
        true
    }
}
