//! Threshold evaluation and the public metrics surface.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::{Config, SlidingWindowKind};
use crate::window::{Outcome, SlidingWindow, Snapshot};

/// Sentinel rate reported while the window holds fewer calls than the
/// minimum-calls threshold.
const RATE_NOT_AVAILABLE: f32 = -1.0;

/// Result of evaluating a freshly recorded outcome against the thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ThresholdCheck {
    /// Too few calls in the window to evaluate rates.
    BelowMinimumCalls,
    /// Enough calls, and both rates are under their thresholds.
    BelowThresholds,
    /// Only the failure rate reached its threshold.
    FailureRateExceeded { failure_rate: f32 },
    /// Only the slow-call rate reached its threshold.
    SlowCallRateExceeded { slow_call_rate: f32 },
    /// Both rates reached their thresholds.
    AboveThresholds {
        failure_rate: f32,
        slow_call_rate: f32,
    },
}

impl ThresholdCheck {
    pub(crate) fn is_exceeded(&self) -> bool {
        !matches!(
            self,
            ThresholdCheck::BelowMinimumCalls | ThresholdCheck::BelowThresholds
        )
    }
}

/// Records call outcomes into a sliding window and classifies each one
/// against the configured thresholds.
///
/// The window lives behind a mutex so recording and snapshot reads are
/// mutually exclusive; a snapshot never observes a half-evicted state. The
/// epoch for the time window is measured from a monotonic anchor, so wall
/// clock steps cannot shear the window.
#[derive(Debug)]
pub(crate) struct MetricsRecorder {
    failure_rate_threshold: f32,
    slow_call_rate_threshold: f32,
    slow_call_duration_threshold: Duration,
    minimum_number_of_calls: u64,
    window: Mutex<SlidingWindow>,
    started: Instant,
    not_permitted: AtomicU64,
}

impl MetricsRecorder {
    /// Recorder for the Closed state: window shape and thresholds straight
    /// from the configuration.
    pub(crate) fn for_closed<E>(config: &Config<E>) -> Self {
        let size = config.sliding_window_size.max(1) as usize;
        let (window, minimum) = match config.sliding_window_kind {
            SlidingWindowKind::CountBased => (
                SlidingWindow::count(size),
                config.minimum_number_of_calls.min(size as u64),
            ),
            SlidingWindowKind::TimeBased => {
                (SlidingWindow::time(size, 0), config.minimum_number_of_calls)
            }
        };
        Self::new(config, window, minimum)
    }

    /// Recorder for the HalfOpen state: a count window sized by the number
    /// of permitted probe calls.
    pub(crate) fn for_half_open<E>(config: &Config<E>) -> Self {
        let permitted = config.permitted_number_of_calls_in_half_open.max(1) as usize;
        let window = SlidingWindow::count(permitted);
        let minimum = config.minimum_number_of_calls.min(permitted as u64);
        Self::new(config, window, minimum)
    }

    /// Recorder for the administrative states, which never record outcomes.
    pub(crate) fn for_static<E>(config: &Config<E>) -> Self {
        Self::for_closed(config)
    }

    fn new<E>(config: &Config<E>, window: SlidingWindow, minimum: u64) -> Self {
        Self {
            failure_rate_threshold: config.failure_rate_threshold,
            slow_call_rate_threshold: config.slow_call_rate_threshold,
            slow_call_duration_threshold: config.slow_call_duration_threshold,
            minimum_number_of_calls: minimum.max(1),
            window: Mutex::new(window),
            started: Instant::now(),
            not_permitted: AtomicU64::new(0),
        }
    }

    fn epoch_second(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub(crate) fn on_success(&self, duration: Duration) -> ThresholdCheck {
        self.record(duration, false)
    }

    pub(crate) fn on_error(&self, duration: Duration) -> ThresholdCheck {
        self.record(duration, true)
    }

    pub(crate) fn on_call_not_permitted(&self) {
        self.not_permitted.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, duration: Duration, failed: bool) -> ThresholdCheck {
        let slow = duration > self.slow_call_duration_threshold;
        let outcome = match (failed, slow) {
            (false, false) => Outcome::Success,
            (false, true) => Outcome::SlowSuccess,
            (true, false) => Outcome::Failure,
            (true, true) => Outcome::SlowFailure,
        };
        let snapshot = self
            .window
            .lock()
            .record(self.epoch_second(), duration, outcome);
        self.check(&snapshot)
    }

    fn rates(&self, snapshot: &Snapshot) -> (f32, f32) {
        if snapshot.calls < self.minimum_number_of_calls {
            return (RATE_NOT_AVAILABLE, RATE_NOT_AVAILABLE);
        }
        let calls = snapshot.calls as f32;
        let failure_rate = snapshot.failed_calls as f32 * 100.0 / calls;
        let slow_call_rate = snapshot.slow_calls as f32 * 100.0 / calls;
        (failure_rate, slow_call_rate)
    }

    fn check(&self, snapshot: &Snapshot) -> ThresholdCheck {
        let (failure_rate, slow_call_rate) = self.rates(snapshot);
        if failure_rate < 0.0 {
            return ThresholdCheck::BelowMinimumCalls;
        }
        let failure_exceeded = failure_rate >= self.failure_rate_threshold;
        let slow_exceeded = slow_call_rate >= self.slow_call_rate_threshold;
        match (failure_exceeded, slow_exceeded) {
            (true, true) => ThresholdCheck::AboveThresholds {
                failure_rate,
                slow_call_rate,
            },
            (true, false) => ThresholdCheck::FailureRateExceeded { failure_rate },
            (false, true) => ThresholdCheck::SlowCallRateExceeded { slow_call_rate },
            (false, false) => ThresholdCheck::BelowThresholds,
        }
    }

    /// Immutable view of the window at this instant.
    pub(crate) fn metrics(&self) -> Metrics {
        let snapshot = self.window.lock().snapshot(self.epoch_second());
        let (failure_rate, slow_call_rate) = self.rates(&snapshot);
        Metrics {
            failure_rate,
            slow_call_rate,
            number_of_calls: snapshot.calls,
            number_of_failed_calls: snapshot.failed_calls,
            number_of_slow_calls: snapshot.slow_calls,
            number_of_slow_failed_calls: snapshot.slow_failed_calls,
            number_of_not_permitted_calls: self.not_permitted.load(Ordering::Relaxed),
        }
    }
}

/// Read-only metrics for a circuit breaker, captured at a single instant.
///
/// Rates are percentages; both report `-1.0` while the window holds fewer
/// calls than the minimum-calls threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    failure_rate: f32,
    slow_call_rate: f32,
    number_of_calls: u64,
    number_of_failed_calls: u64,
    number_of_slow_calls: u64,
    number_of_slow_failed_calls: u64,
    number_of_not_permitted_calls: u64,
}

impl Metrics {
    /// Percentage of failed calls in the window, or `-1.0` below the
    /// minimum-calls threshold.
    pub fn failure_rate(&self) -> f32 {
        self.failure_rate
    }

    /// Percentage of slow calls in the window, or `-1.0` below the
    /// minimum-calls threshold.
    pub fn slow_call_rate(&self) -> f32 {
        self.slow_call_rate
    }

    /// Total calls currently held by the window.
    pub fn number_of_calls(&self) -> u64 {
        self.number_of_calls
    }

    /// Calls recorded as successful.
    pub fn number_of_successful_calls(&self) -> u64 {
        self.number_of_calls - self.number_of_failed_calls
    }

    /// Calls recorded as failures.
    pub fn number_of_failed_calls(&self) -> u64 {
        self.number_of_failed_calls
    }

    /// Calls that exceeded the slow-call duration threshold.
    pub fn number_of_slow_calls(&self) -> u64 {
        self.number_of_slow_calls
    }

    /// Slow calls that were nonetheless successful.
    pub fn number_of_slow_successful_calls(&self) -> u64 {
        self.number_of_slow_calls - self.number_of_slow_failed_calls
    }

    /// Slow calls that also failed.
    pub fn number_of_slow_failed_calls(&self) -> u64 {
        self.number_of_slow_failed_calls
    }

    /// Calls denied without execution since this window was installed.
    pub fn number_of_not_permitted_calls(&self) -> u64 {
        self.number_of_not_permitted_calls
    }
}
