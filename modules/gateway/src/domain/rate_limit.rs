//! Per-connection fixed-window rate limiting.
//!
//! Fixed windows (not sliding): the epoch is divided into consecutive
//! windows of `window_secs`, a request lands in the window covering its
//! arrival time, and the counter resets at each window boundary. This makes
//! the quota exactly reproducible in tests: the N+1-th request inside one
//! window is rejected, the first request of the next window is admitted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;

use hub_sdk::{ConnectionId, HubError};

/// Time source for window arithmetic. Injected so tests can step windows
/// deterministically.
pub trait Clock: Send + Sync {
    fn now_epoch_secs(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Manually-advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn at(epoch_secs: u64) -> Self {
        Self {
            now: AtomicU64::new(epoch_secs),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct Slot {
    window_start: u64,
    used: u32,
}

/// Quota counters, one slot per connection.
///
/// Each slot sits behind its own mutex so concurrent requests against the
/// same connection serialize on the counter and can never both observe
/// "0 used" in one window. Requests for different connections touch
/// different slots and never contend.
pub struct FixedWindowLimiter {
    slots: DashMap<ConnectionId, Mutex<Slot>>,
    clock: Arc<dyn Clock>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            clock,
        }
    }

    /// Admit or reject one request for `id` under `limit` per `window_secs`.
    ///
    /// # Errors
    /// `RateLimited` with a retry-after hint (seconds until the current
    /// window ends) when the quota is exhausted.
    pub fn check(&self, id: ConnectionId, limit: u32, window_secs: u64) -> Result<(), HubError> {
        let window_secs = window_secs.max(1);
        let now = self.clock.now_epoch_secs();
        let window_start = now - now % window_secs;

        let slot = self.slots.entry(id).or_insert_with(|| {
            Mutex::new(Slot {
                window_start,
                used: 0,
            })
        });
        let mut slot = slot.lock();

        if slot.window_start != window_start {
            slot.window_start = window_start;
            slot.used = 0;
        }

        if slot.used >= limit {
            let retry_after_sec = window_start + window_secs - now;
            return Err(HubError::rate_limited(retry_after_sec));
        }

        slot.used += 1;
        Ok(())
    }
}
