use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use crate::constants::SEARCH_WARN_INTERVAL;

const NEVER: u64 = u64::MAX;

/// Lets a diagnostic through at most once per `interval`.
///
/// Lock-free so it can be consulted from any thread that queries a
/// position map, including while the decode thread holds a write lock
/// elsewhere.
#[derive(Debug)]
pub struct WarnThrottle {
    origin: Instant,
    interval: Duration,
    /// Milliseconds since `origin` of the last emission, or `NEVER`.
    last_emit_ms: AtomicU64,
}

impl WarnThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            interval,
            last_emit_ms: AtomicU64::new(NEVER),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Returns `true` if a message may be emitted at `now`, and records `now`
    /// as the last emission when it does.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let now_ms = now.saturating_duration_since(self.origin).as_millis() as u64;
        let interval_ms = self.interval.as_millis() as u64;

        let mut last = self.last_emit_ms.load(Ordering::Relaxed);
        loop {
            if last != NEVER && now_ms.saturating_sub(last) < interval_ms {
                return false;
            }
            match self.last_emit_ms.compare_exchange_weak(
                last,
                now_ms,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => last = current,
            }
        }
    }
}

impl Default for WarnThrottle {
    fn default() -> Self {
        Self::new(SEARCH_WARN_INTERVAL)
    }
}
