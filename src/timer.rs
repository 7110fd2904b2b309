//! Cancellable one-shot timer used for automatic state transitions.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cancellable scheduled callback with an exactly-once guarantee.
///
/// The expiry path and the cancel path race through a single atomic
/// `decided` flag: whichever swaps it first wins, the loser is a no-op.
/// Cancellation also wakes the waiting thread early so a cancelled timer
/// does not linger for its full duration.
#[derive(Debug, Clone)]
pub(crate) struct TimerToken {
    shared: Arc<TimerShared>,
}

#[derive(Debug)]
struct TimerShared {
    decided: AtomicBool,
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl TimerToken {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(TimerShared {
                decided: AtomicBool::new(false),
                cancelled: Mutex::new(false),
                wake: Condvar::new(),
            }),
        }
    }

    /// Cancels the timer. No-op if the timer already fired.
    pub(crate) fn cancel(&self) {
        if !self.shared.decided.swap(true, Ordering::AcqRel) {
            *self.shared.cancelled.lock() = true;
            self.shared.wake.notify_all();
        }
    }

    /// Blocks for `duration`, then attempts to claim the firing.
    ///
    /// Returns `true` exactly when the full duration elapsed and the timer
    /// was not cancelled in the meantime.
    pub(crate) fn wait_then_claim(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.shared.cancelled.lock();
        while !*cancelled {
            if self
                .shared
                .wake
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                break;
            }
        }
        if *cancelled {
            return false;
        }
        drop(cancelled);
        !self.shared.decided.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fires_after_the_duration() {
        let token = TimerToken::new();
        assert!(token.wait_then_claim(Duration::from_millis(10)));
    }

    #[test]
    fn cancel_prevents_firing() {
        let token = TimerToken::new();
        token.cancel();
        assert!(!token.wait_then_claim(Duration::from_millis(10)));
    }

    #[test]
    fn cancel_wakes_the_waiter_early() {
        let token = TimerToken::new();
        let waiter = {
            let token = token.clone();
            thread::spawn(move || {
                let started = Instant::now();
                let fired = token.wait_then_claim(Duration::from_secs(30));
                (fired, started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        let (fired, waited) = waiter.join().unwrap();
        assert!(!fired);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn at_most_one_side_wins() {
        let token = TimerToken::new();
        assert!(token.wait_then_claim(Duration::from_millis(1)));
        // The late cancel loses and must not un-fire the timer.
        token.cancel();
        assert!(!token.wait_then_claim(Duration::from_millis(1)));
    }
}
