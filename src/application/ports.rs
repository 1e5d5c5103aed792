//! Ports (interfaces) for the application layer.
//!
//! The limiter only talks to time, storage and randomness through these
//! traits. Infrastructure provides the adapters.

use std::fmt::Debug;
use std::hash::Hash;
use std::time::Instant;

/// Port for obtaining current time.
///
/// Infrastructure provides `SystemClock`; tests use `MockClock`.
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port for concurrent key-value storage of limiter records.
///
/// Implementations must run `with_entry_mut` atomically for a given key:
/// concurrent callers on the same key observe each other's updates and no
/// increment is lost. Infrastructure provides `ShardedStorage` (in memory)
/// and, with the `redis-storage` feature, `RedisStorage`.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry mutably, creating it with `factory` if absent.
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Remove entries for which the predicate returns false.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;

    /// Whether the backend drops stale entries by itself (e.g. a TTL).
    ///
    /// Limiters skip opportunistic sweeps for such stores; explicit sweeps
    /// still run.
    fn expires_entries(&self) -> bool {
        false
    }
}

/// Port deciding whether a given call should also run a cleanup sweep.
pub trait SweepSampler: Send + Sync + Debug {
    /// Return true with the given probability (`0.0..=1.0`).
    fn sample(&self, probability: f64) -> bool;
}
