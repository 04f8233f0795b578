use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::sync_ext::{CondvarExt, MutexExt};

/// Cooperative cancellation shared by every long-lived task. Cloning hands
/// out another handle to the same token.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: Mutex<bool>,
    cv: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: Mutex::new(false),
                cv: Condvar::new(),
            }),
        }
    }

    /// Idempotent; wakes every sleeper immediately.
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock_unpoisoned();
        *cancelled = true;
        self.inner.cv.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock_unpoisoned()
    }

    /// Sleep for `duration` unless the token fires first: "timer OR cancel,
    /// whichever comes first". Returns true iff the timer fired.
    pub fn sleep_for(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.inner.cancelled.lock_unpoisoned();
        loop {
            if *cancelled {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let (guard, _timeout) = self
                .inner
                .cv
                .wait_timeout_unpoisoned(cancelled, deadline - now);
            cancelled = guard;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
