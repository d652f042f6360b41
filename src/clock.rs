//! Time sources for the in-process counting engines.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Clock abstraction so window arithmetic can be driven by fake time in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Seconds since the Unix epoch.
    fn now_seconds(&self) -> u64;
}

/// Wall clock backed by [`SystemTime::now`].
///
/// Wall time is used rather than a monotonic instant so bucket boundaries line
/// up with the ones computed by the Redis store from its own `TIME`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_seconds: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock frozen at `now_seconds`.
    pub fn new(now_seconds: u64) -> Self {
        Self {
            now_seconds: Arc::new(AtomicU64::new(now_seconds)),
        }
    }

    /// Move the clock forward, truncating to whole seconds.
    pub fn advance(&self, by: Duration) {
        self.now_seconds.fetch_add(by.as_secs(), Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_seconds: u64) {
        self.now_seconds.store(now_seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_seconds(&self) -> u64 {
        self.now_seconds.load(Ordering::SeqCst)
    }
}
