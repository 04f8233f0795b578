use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::cancel::CancelToken;
use crate::sync_ext::{CondvarExt, MutexExt};

/// Latch shared by discovery and dispatch. While closed, both loops park at
/// their next `wait`; opening broadcasts to all waiters.
pub struct PauseGate {
    open: Mutex<bool>,
    cv: Condvar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateWait {
    /// The gate was open at the moment of unblocking.
    Open,
    /// The cancellation token fired while waiting.
    Cancelled,
}

impl PauseGate {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(true),
            cv: Condvar::new(),
        }
    }

    /// Idempotent. Waiters already parked stay parked.
    pub fn close(&self) {
        let mut open = self.open.lock_unpoisoned();
        *open = false;
    }

    /// Idempotent; wakes every waiter.
    pub fn open(&self) {
        let mut open = self.open.lock_unpoisoned();
        *open = true;
        self.cv.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        !*self.open.lock_unpoisoned()
    }

    /// Block until the gate is open or the token fires. The token has no
    /// handle on our condvar, so a parked waiter observes cancellation on
    /// the next poll tick.
    pub fn wait(&self, token: &CancelToken) -> GateWait {
        const POLL: Duration = Duration::from_millis(50);

        let mut open = self.open.lock_unpoisoned();
        loop {
            if token.is_cancelled() {
                return GateWait::Cancelled;
            }
            if *open {
                return GateWait::Open;
            }
            let (guard, _timeout) = self.cv.wait_timeout_unpoisoned(open, POLL);
            open = guard;
        }
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn wait_returns_open_on_an_open_gate() {
        let gate = PauseGate::new();
        let token = CancelToken::new();
        assert_eq!(gate.wait(&token), GateWait::Open);
    }

    #[test]
    fn close_is_idempotent_and_open_wakes_waiters() {
        let gate = Arc::new(PauseGate::new());
        gate.close();
        gate.close();
        assert!(gate.is_closed());

        let token = CancelToken::new();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let gate = gate.clone();
            let token = token.clone();
            handles.push(thread::spawn(move || gate.wait(&token)));
        }

        thread::sleep(Duration::from_millis(30));
        gate.open();

        for handle in handles {
            assert_eq!(handle.join().expect("waiter join"), GateWait::Open);
        }
    }

    #[test]
    fn cancel_unblocks_a_waiter_parked_on_a_closed_gate() {
        let gate = Arc::new(PauseGate::new());
        gate.close();
        let token = CancelToken::new();

        let waiter_gate = gate.clone();
        let waiter_token = token.clone();
        let handle = thread::spawn(move || {
            let started = Instant::now();
            (waiter_gate.wait(&waiter_token), started.elapsed())
        });

        thread::sleep(Duration::from_millis(30));
        token.cancel();

        let (outcome, elapsed) = handle.join().expect("waiter join");
        assert_eq!(outcome, GateWait::Cancelled);
        assert!(
            elapsed < Duration::from_secs(5),
            "cancel must unpark the waiter promptly, took {elapsed:?}"
        );
    }
}
