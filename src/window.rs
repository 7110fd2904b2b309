//! Sliding-window aggregation for call outcomes.
//!
//! Two window shapes back the metrics engine: a count-based window over the
//! last N calls, and a time-based window of per-second buckets. Both keep a
//! running total that is updated incrementally as buckets are evicted, so a
//! snapshot is O(1) regardless of window size.

use smallvec::SmallVec;
use std::time::Duration;

/// Classification of a single recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Completed successfully within the slow-call duration threshold.
    Success,
    /// Completed successfully but exceeded the slow-call duration threshold.
    SlowSuccess,
    /// Failed within the slow-call duration threshold.
    Failure,
    /// Failed and exceeded the slow-call duration threshold.
    SlowFailure,
}

impl Outcome {
    fn is_failure(self) -> bool {
        matches!(self, Outcome::Failure | Outcome::SlowFailure)
    }

    fn is_slow(self) -> bool {
        matches!(self, Outcome::SlowSuccess | Outcome::SlowFailure)
    }
}

/// Plain numeric accumulator for a set of recorded calls.
///
/// Invariants: `slow_calls <= calls`, `failed_calls <= calls` and
/// `slow_failed_calls <= min(failed_calls, slow_calls)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Aggregation {
    total_duration: Duration,
    calls: u64,
    failed_calls: u64,
    slow_calls: u64,
    slow_failed_calls: u64,
}

impl Aggregation {
    fn record(&mut self, duration: Duration, outcome: Outcome) {
        self.total_duration += duration;
        self.calls += 1;
        if outcome.is_failure() {
            self.failed_calls += 1;
        }
        if outcome.is_slow() {
            self.slow_calls += 1;
        }
        if outcome.is_failure() && outcome.is_slow() {
            self.slow_failed_calls += 1;
        }
    }

    /// Removes an evicted bucket's contribution from this total.
    fn discard(&mut self, evicted: &Aggregation) {
        self.total_duration = self.total_duration.saturating_sub(evicted.total_duration);
        self.calls = self.calls.saturating_sub(evicted.calls);
        self.failed_calls = self.failed_calls.saturating_sub(evicted.failed_calls);
        self.slow_calls = self.slow_calls.saturating_sub(evicted.slow_calls);
        self.slow_failed_calls = self
            .slow_failed_calls
            .saturating_sub(evicted.slow_failed_calls);
    }

    fn reset(&mut self) {
        *self = Aggregation::default();
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            total_duration: self.total_duration,
            calls: self.calls,
            failed_calls: self.failed_calls,
            slow_calls: self.slow_calls,
            slow_failed_calls: self.slow_failed_calls,
        }
    }
}

/// Immutable point-in-time copy of a window's total aggregation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub(crate) total_duration: Duration,
    pub(crate) calls: u64,
    pub(crate) failed_calls: u64,
    pub(crate) slow_calls: u64,
    pub(crate) slow_failed_calls: u64,
}

/// One of the two sliding-window recorder shapes.
#[derive(Debug)]
pub(crate) enum SlidingWindow {
    Count(CountWindow),
    Time(TimeWindow),
}

impl SlidingWindow {
    pub(crate) fn count(size: usize) -> Self {
        SlidingWindow::Count(CountWindow::new(size))
    }

    pub(crate) fn time(size: usize, epoch_second: u64) -> Self {
        SlidingWindow::Time(TimeWindow::new(size, epoch_second))
    }

    /// Records one outcome and returns the post-record snapshot.
    ///
    /// `epoch_second` is only consulted by the time window; the count window
    /// ignores it.
    pub(crate) fn record(
        &mut self,
        epoch_second: u64,
        duration: Duration,
        outcome: Outcome,
    ) -> Snapshot {
        match self {
            SlidingWindow::Count(window) => window.record(duration, outcome),
            SlidingWindow::Time(window) => window.record(epoch_second, duration, outcome),
        }
    }

    pub(crate) fn snapshot(&mut self, epoch_second: u64) -> Snapshot {
        match self {
            SlidingWindow::Count(window) => window.total.snapshot(),
            SlidingWindow::Time(window) => {
                window.advance_to(epoch_second);
                window.total.snapshot()
            }
        }
    }
}

/// Fixed-size circular window over the last N recorded calls.
#[derive(Debug)]
pub(crate) struct CountWindow {
    total: Aggregation,
    buckets: SmallVec<[Aggregation; 16]>,
    head: usize,
}

impl CountWindow {
    fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            total: Aggregation::default(),
            buckets: smallvec::smallvec![Aggregation::default(); size],
            head: 0,
        }
    }

    fn record(&mut self, duration: Duration, outcome: Outcome) -> Snapshot {
        self.total.record(duration, outcome);
        self.head = (self.head + 1) % self.buckets.len();
        let evicted = self.buckets[self.head];
        self.total.discard(&evicted);
        let slot = &mut self.buckets[self.head];
        slot.reset();
        slot.record(duration, outcome);
        self.total.snapshot()
    }
}

#[derive(Debug)]
struct TimedBucket {
    epoch_second: u64,
    aggregation: Aggregation,
}

/// Time window of per-second buckets, each tagged with the epoch second it
/// represents. A bucket's contribution vanishes exactly `size` seconds after
/// it was last written to, regardless of call volume.
#[derive(Debug)]
pub(crate) struct TimeWindow {
    total: Aggregation,
    buckets: SmallVec<[TimedBucket; 16]>,
    head: usize,
}

impl TimeWindow {
    fn new(size: usize, epoch_second: u64) -> Self {
        let size = size.max(1);
        let buckets = (0..size)
            .map(|i| TimedBucket {
                epoch_second: epoch_second + i as u64,
                aggregation: Aggregation::default(),
            })
            .collect();
        Self {
            total: Aggregation::default(),
            buckets,
            head: 0,
        }
    }

    /// Advances the head bucket to `epoch_second`, evicting and re-tagging
    /// every bucket passed on the way. A gap wider than the window clears
    /// each bucket exactly once.
    fn advance_to(&mut self, epoch_second: u64) {
        let latest = self.buckets[self.head].epoch_second;
        if epoch_second <= latest {
            return;
        }
        let mut remaining = (epoch_second - latest).min(self.buckets.len() as u64);
        while remaining > 0 {
            remaining -= 1;
            self.head = (self.head + 1) % self.buckets.len();
            let evicted = self.buckets[self.head].aggregation;
            self.total.discard(&evicted);
            let bucket = &mut self.buckets[self.head];
            bucket.aggregation.reset();
            bucket.epoch_second = epoch_second - remaining;
        }
    }

    fn record(&mut self, epoch_second: u64, duration: Duration, outcome: Outcome) -> Snapshot {
        self.advance_to(epoch_second);
        self.total.record(duration, outcome);
        self.buckets[self.head].aggregation.record(duration, outcome);
        self.total.snapshot()
    }
}
