//! Object Pool
//!
//! Checkout/return pool for values that are expensive to allocate on a hot
//! path (decoded events, serialization buffers). A checked out value is owned
//! exclusively by its [`Pooled`] guard; dropping the guard resets the value
//! and hands it back, so stale contents can never leak into the next use.

use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Return a value to its zero state before reuse.
///
/// Implementations must clear every field that could carry data from one
/// message into the next. Capacity may be kept.
pub trait Reset {
    fn reset(&mut self);
}

impl Reset for Vec<u8> {
    fn reset(&mut self) {
        // Zero the initialized bytes so a later `set_len` or unsafe read
        // cannot observe a previous message.
        self.iter_mut().for_each(|b| *b = 0);
        self.clear();
    }
}

impl Reset for String {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Configuration for an object pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Values kept idle after return; extras are dropped
    pub max_idle: usize,
    /// Values created up front
    pub preallocate: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 64,
            preallocate: 0,
        }
    }
}

/// Pool counters
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Values constructed because the pool was empty
    pub created: AtomicU64,
    /// Successful checkouts
    pub checkouts: AtomicU64,
    /// Values returned to the idle list
    pub returned: AtomicU64,
    /// Values dropped because the idle list was full
    pub discarded: AtomicU64,
}

impl PoolStats {
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn checkouts(&self) -> u64 {
        self.checkouts.load(Ordering::Relaxed)
    }

    pub fn returned(&self) -> u64 {
        self.returned.load(Ordering::Relaxed)
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

/// Generic object pool
///
/// Thread-safe; checkouts from multiple threads only contend on the short
/// critical section that pops or pushes the idle list.
pub struct Pool<T: Reset + Default> {
    idle: Mutex<Vec<T>>,
    config: PoolConfig,
    stats: PoolStats,
}

impl<T: Reset + Default> Pool<T> {
    /// Create a pool with default configuration
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool with explicit configuration
    pub fn with_config(config: PoolConfig) -> Self {
        let preallocate = config.preallocate.min(config.max_idle);
        let idle: Vec<T> = (0..preallocate).map(|_| T::default()).collect();
        debug!(
            type_name = std::any::type_name::<T>(),
            max_idle = config.max_idle,
            preallocated = preallocate,
            "Object pool created"
        );
        Self {
            idle: Mutex::new(idle),
            config,
            stats: PoolStats::default(),
        }
    }

    /// Take a value out of the pool, constructing one if none is idle.
    pub fn checkout(&self) -> Pooled<'_, T> {
        let value = match self.idle.lock().pop() {
            Some(value) => value,
            None => {
                self.stats.created.fetch_add(1, Ordering::Relaxed);
                T::default()
            }
        };
        self.stats.checkouts.fetch_add(1, Ordering::Relaxed);
        Pooled {
            pool: self,
            value: Some(value),
        }
    }

    /// Run `f` with a checked out value. The value is reset and returned
    /// when `f` finishes, whether it succeeded or not.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.checkout();
        f(&mut guard)
    }

    /// Number of idle values.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn release(&self, mut value: T) {
        value.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_idle {
            idle.push(value);
            self.stats.returned.fetch_add(1, Ordering::Relaxed);
        } else {
            drop(idle);
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            trace!("Pool full, dropping returned value");
        }
    }
}

impl<T: Reset + Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Reset + Default> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("type", &std::any::type_name::<T>())
            .field("idle", &self.idle())
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Exclusive handle to a pooled value.
///
/// Dereferences to `T`. On drop the value is reset and returned to its pool.
pub struct Pooled<'a, T: Reset + Default> {
    pool: &'a Pool<T>,
    value: Option<T>,
}

impl<T: Reset + Default> Pooled<'_, T> {
    /// Take the value out of the pool for good. It is not reset and the
    /// pool constructs a replacement on a later checkout.
    pub fn detach(mut self) -> T {
        self.value.take().unwrap_or_default()
    }
}

impl<T: Reset + Default> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `detach` and `drop` empty the slot, and both consume the guard.
        match self.value.as_ref() {
            Some(value) => value,
            None => unreachable!("pooled value accessed after release"),
        }
    }
}

impl<T: Reset + Default> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.value.as_mut() {
            Some(value) => value,
            None => unreachable!("pooled value accessed after release"),
        }
    }
}

impl<T: Reset + Default> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}

impl<T: Reset + Default + fmt::Debug> fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.value).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Message {
        uid: String,
        payload: Vec<u8>,
    }

    impl Reset for Message {
        fn reset(&mut self) {
            self.uid.clear();
            self.payload.reset();
        }
    }

    #[test]
    fn test_checkout_reuses_returned_value() {
        let pool: Pool<Vec<u8>> = Pool::new();
        {
            let mut buf = pool.checkout();
            buf.extend_from_slice(b"first message");
        }
        assert_eq!(pool.idle(), 1);

        let buf = pool.checkout();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 13);
        assert_eq!(pool.stats().created(), 1);
        assert_eq!(pool.stats().checkouts(), 2);
    }

    #[test]
    fn test_release_resets_all_fields() {
        let pool: Pool<Message> = Pool::new();
        pool.with(|msg| {
            msg.uid.push_str("ANDROID-1");
            msg.payload.extend_from_slice(b"secret");
        });

        let msg = pool.checkout();
        assert!(msg.uid.is_empty());
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn test_max_idle_discards_extras() {
        let pool: Pool<String> = Pool::with_config(PoolConfig {
            max_idle: 1,
            preallocate: 0,
        });
        let a = pool.checkout();
        let b = pool.checkout();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.stats().returned(), 1);
        assert_eq!(pool.stats().discarded(), 1);
    }

    #[test]
    fn test_preallocate() {
        let pool: Pool<String> = Pool::with_config(PoolConfig {
            max_idle: 4,
            preallocate: 8,
        });
        assert_eq!(pool.idle(), 4);
        let _s = pool.checkout();
        assert_eq!(pool.stats().created(), 0);
    }

    #[test]
    fn test_with_returns_on_error() {
        let pool: Pool<String> = Pool::new();
        let result: Result<(), &str> = pool.with(|s| {
            s.push_str("partial");
            Err("failed")
        });
        assert!(result.is_err());
        assert_eq!(pool.idle(), 1);
        assert!(pool.checkout().is_empty());
    }

    #[test]
    fn test_detach_keeps_value() {
        let pool: Pool<String> = Pool::new();
        let mut s = pool.checkout();
        s.push_str("kept");
        let owned = s.detach();
        assert_eq!(owned, "kept");
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_concurrent_checkouts() {
        let pool: Pool<Vec<u8>> = Pool::new();
        std::thread::scope(|scope| {
            for i in 0..8u8 {
                let pool = &pool;
                scope.spawn(move || {
                    for _ in 0..100 {
                        let mut buf = pool.checkout();
                        assert!(buf.is_empty());
                        buf.push(i);
                    }
                });
            }
        });
        assert_eq!(pool.stats().checkouts(), 800);
        assert!(pool.idle() <= 8);
    }
}
