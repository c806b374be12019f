//! Size-keyed storage pool with lazy stale eviction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

/// Minimum time between two automatic sweeps of idle storage.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Storage idle for longer than this is dropped by the next sweep.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Idle {
    storage: Vec<u8>,
    returned_at: Instant,
}

#[derive(Debug)]
struct PoolState {
    idle: HashMap<usize, Vec<Idle>>,
    last_sweep: Instant,
}

/// A thread-safe pool of byte storage keyed by exact length.
///
/// [`rent`](Self::rent) hands out a previously returned allocation of the
/// same length when one is idle, and allocates otherwise. Returned storage
/// that stays idle past `stale_after` is released by a sweep that runs at
/// most once per `sweep_interval`, triggered from `rent` and `give_back`.
///
/// # Example
///
/// ```
/// use buffers::BufferPool;
///
/// let pool = BufferPool::new();
/// let storage = pool.rent(4096);
/// assert_eq!(storage.len(), 4096);
///
/// pool.give_back(storage);
/// assert_eq!(pool.pooled_count(), 1);
///
/// let again = pool.rent(4096);
/// assert_eq!(again.len(), 4096);
/// assert_eq!(pool.pooled_count(), 0);
/// ```
#[derive(Debug)]
pub struct BufferPool {
    state: Mutex<PoolState>,
    sweep_interval: Duration,
    stale_after: Duration,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    /// Creates a pool with the default sweep timings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timings(DEFAULT_SWEEP_INTERVAL, DEFAULT_STALE_AFTER)
    }

    /// Creates a pool with custom sweep timings.
    #[must_use]
    pub fn with_timings(sweep_interval: Duration, stale_after: Duration) -> Self {
        Self {
            state: Mutex::new(PoolState {
                idle: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            sweep_interval,
            stale_after,
        }
    }

    /// Returns the process-wide pool shared by all streams.
    #[must_use]
    pub fn global() -> &'static Arc<Self> {
        static GLOBAL: OnceLock<Arc<BufferPool>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::new()))
    }

    /// Rents storage of exactly `size` bytes.
    ///
    /// Reused storage keeps whatever bytes it held before; callers track
    /// validity through their own cursors.
    #[must_use]
    pub fn rent(&self, size: usize) -> Vec<u8> {
        let reused = {
            let mut state = self.lock();
            self.sweep_if_due(&mut state, Instant::now());
            let bucket = state.idle.get_mut(&size);
            let found = bucket.and_then(Vec::pop).map(|idle| idle.storage);
            if state.idle.get(&size).is_some_and(Vec::is_empty) {
                state.idle.remove(&size);
            }
            found
        };

        reused.unwrap_or_else(|| vec![0u8; size])
    }

    /// Makes `storage` available to later [`rent`](Self::rent) calls.
    ///
    /// Empty storage is ignored.
    pub fn give_back(&self, storage: Vec<u8>) {
        if storage.is_empty() {
            return;
        }

        let now = Instant::now();
        let mut state = self.lock();
        self.sweep_if_due(&mut state, now);
        state.idle.entry(storage.len()).or_default().push(Idle {
            storage,
            returned_at: now,
        });
    }

    /// Drops every idle allocation older than the stale threshold, regardless
    /// of when the last sweep ran. Returns the number of allocations released.
    pub fn sweep_now(&self) -> usize {
        let mut state = self.lock();
        self.sweep(&mut state, Instant::now())
    }

    /// Number of idle allocations currently held.
    #[must_use]
    pub fn pooled_count(&self) -> usize {
        self.lock().idle.values().map(Vec::len).sum()
    }

    /// Total bytes held by idle allocations.
    #[must_use]
    pub fn pooled_bytes(&self) -> usize {
        self.lock()
            .idle
            .iter()
            .map(|(size, bucket)| size * bucket.len())
            .sum()
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // The state stays consistent across a panicking holder, so recover it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweep_if_due(&self, state: &mut PoolState, now: Instant) {
        if now.saturating_duration_since(state.last_sweep) >= self.sweep_interval {
            self.sweep(state, now);
        }
    }

    fn sweep(&self, state: &mut PoolState, now: Instant) -> usize {
        state.last_sweep = now;
        let mut evicted = 0;
        state.idle.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|idle| now.saturating_duration_since(idle.returned_at) <= self.stale_after);
            evicted += before - bucket.len();
            !bucket.is_empty()
        });

        if evicted > 0 {
            trace_sweep(evicted, state.idle.values().map(Vec::len).sum());
        }
        evicted
    }
}

#[cfg(feature = "tracing")]
#[inline]
fn trace_sweep(evicted: usize, remaining: usize) {
    tracing::debug!(
        target: "compress::pool",
        evicted = evicted,
        remaining = remaining,
        "released stale pooled buffers"
    );
}

#[cfg(not(feature = "tracing"))]
#[inline]
const fn trace_sweep(_evicted: usize, _remaining: usize) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn rent_returns_exact_length() {
        let pool = BufferPool::new();
        assert_eq!(pool.rent(1).len(), 1);
        assert_eq!(pool.rent(65_536).len(), 65_536);
    }

    #[test]
    fn give_back_then_rent_reuses_same_allocation() {
        let pool = BufferPool::new();
        let storage = pool.rent(1024);
        let address = storage.as_ptr();
        pool.give_back(storage);

        let again = pool.rent(1024);
        assert_eq!(again.as_ptr(), address);
        assert_eq!(pool.pooled_count(), 0);
    }

    #[test]
    fn reuse_requires_exact_size_match() {
        let pool = BufferPool::new();
        pool.give_back(vec![0u8; 2048]);

        let smaller = pool.rent(1024);
        assert_eq!(smaller.len(), 1024);
        assert_eq!(pool.pooled_count(), 1);
        assert_eq!(pool.pooled_bytes(), 2048);
    }

    #[test]
    fn empty_storage_is_ignored() {
        let pool = BufferPool::new();
        pool.give_back(Vec::new());
        assert_eq!(pool.pooled_count(), 0);
    }

    #[test]
    fn sweep_now_evicts_only_stale_entries() {
        let pool = BufferPool::with_timings(Duration::from_secs(3600), Duration::from_millis(20));
        pool.give_back(vec![0u8; 16]);
        thread::sleep(Duration::from_millis(60));
        pool.give_back(vec![0u8; 32]);

        assert_eq!(pool.sweep_now(), 1);
        assert_eq!(pool.pooled_count(), 1);
        assert_eq!(pool.pooled_bytes(), 32);
    }

    #[test]
    fn lazy_sweep_runs_on_give_back_once_interval_elapsed() {
        let pool = BufferPool::with_timings(Duration::ZERO, Duration::from_millis(10));
        pool.give_back(vec![0u8; 512]);
        thread::sleep(Duration::from_millis(40));

        pool.give_back(vec![0u8; 8]);
        assert_eq!(pool.pooled_count(), 1);
        assert_eq!(pool.pooled_bytes(), 8);
    }

    #[test]
    fn concurrent_rent_and_give_back() {
        let pool = Arc::new(BufferPool::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let storage = pool.rent(4096);
                        assert_eq!(storage.len(), 4096);
                        pool.give_back(storage);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("worker thread panicked");
        }

        assert!(pool.pooled_count() <= 8);
        assert!(pool.pooled_count() >= 1);
    }

    #[test]
    fn global_pool_is_shared() {
        assert!(Arc::ptr_eq(BufferPool::global(), BufferPool::global()));
    }
}
