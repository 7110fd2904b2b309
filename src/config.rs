//! Configuration for circuit breakers.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::CircuitBreaker;

/// Which sliding-window shape the breaker aggregates outcomes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlidingWindowKind {
    /// A circular window over the last N calls.
    CountBased,

    /// A window of per-second buckets spanning N seconds.
    TimeBased,
}

pub(crate) type FailurePredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
pub(crate) type WaitIntervalFn = Arc<dyn Fn(u64) -> Duration + Send + Sync>;

/// Immutable breaker configuration, produced by [`BreakerBuilder::build`].
pub(crate) struct Config<E> {
    pub(crate) sliding_window_kind: SlidingWindowKind,
    pub(crate) sliding_window_size: u32,
    pub(crate) minimum_number_of_calls: u64,
    pub(crate) failure_rate_threshold: f32,
    pub(crate) slow_call_rate_threshold: f32,
    pub(crate) slow_call_duration_threshold: Duration,
    pub(crate) record_failure: FailurePredicate<E>,
    pub(crate) automatic_open_to_half_open: bool,
    pub(crate) wait_interval_fn: WaitIntervalFn,
    pub(crate) permitted_number_of_calls_in_half_open: u32,
    pub(crate) max_wait_duration_in_half_open: Duration,
}

impl<E> fmt::Debug for Config<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("sliding_window_kind", &self.sliding_window_kind)
            .field("sliding_window_size", &self.sliding_window_size)
            .field("minimum_number_of_calls", &self.minimum_number_of_calls)
            .field("failure_rate_threshold", &self.failure_rate_threshold)
            .field("slow_call_rate_threshold", &self.slow_call_rate_threshold)
            .field(
                "slow_call_duration_threshold",
                &self.slow_call_duration_threshold,
            )
            .field(
                "automatic_open_to_half_open",
                &self.automatic_open_to_half_open,
            )
            .field(
                "permitted_number_of_calls_in_half_open",
                &self.permitted_number_of_calls_in_half_open,
            )
            .field(
                "max_wait_duration_in_half_open",
                &self.max_wait_duration_in_half_open,
            )
            .finish_non_exhaustive()
    }
}

/// Builder for creating circuit breakers with custom configurations.
///
/// Every setting is optional; the defaults are a count-based window of 100
/// calls with a minimum of 100 calls to evaluate, a 50% failure-rate
/// threshold, a 100% slow-call-rate threshold, a 60 second slow-call
/// duration threshold, a constant 60 second wait in Open, 10 permitted
/// half-open probes, no automatic Open-to-HalfOpen transition and no
/// half-open wait cap.
pub struct BreakerBuilder<E> {
    name: String,
    sliding_window_kind: SlidingWindowKind,
    sliding_window_size: u32,
    minimum_number_of_calls: u64,
    failure_rate_threshold: f32,
    slow_call_rate_threshold: f32,
    slow_call_duration_threshold: Duration,
    record_failure: FailurePredicate<E>,
    automatic_open_to_half_open: bool,
    wait_interval_fn: WaitIntervalFn,
    permitted_number_of_calls_in_half_open: u32,
    max_wait_duration_in_half_open: Duration,
}

impl<E> BreakerBuilder<E>
where
    E: Error + 'static,
{
    /// Creates a builder with default settings for a breaker named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sliding_window_kind: SlidingWindowKind::CountBased,
            sliding_window_size: 100,
            minimum_number_of_calls: 100,
            failure_rate_threshold: 50.0,
            slow_call_rate_threshold: 100.0,
            slow_call_duration_threshold: Duration::from_secs(60),
            record_failure: Arc::new(|_| true),
            automatic_open_to_half_open: false,
            wait_interval_fn: Arc::new(|_| Duration::from_secs(60)),
            permitted_number_of_calls_in_half_open: 10,
            max_wait_duration_in_half_open: Duration::ZERO,
        }
    }

    /// Sets the sliding-window shape, its size (calls or seconds) and the
    /// minimum number of calls required before rates are evaluated.
    pub fn sliding_window(
        mut self,
        kind: SlidingWindowKind,
        size: u32,
        minimum_number_of_calls: u64,
    ) -> Self {
        self.sliding_window_kind = kind;
        self.sliding_window_size = size;
        self.minimum_number_of_calls = minimum_number_of_calls;
        self
    }

    /// Sets the failure-rate threshold as a percentage.
    pub fn failure_rate_threshold(mut self, percent: f32) -> Self {
        self.failure_rate_threshold = percent;
        self
    }

    /// Sets the slow-call-rate threshold as a percentage.
    pub fn slow_call_rate_threshold(mut self, percent: f32) -> Self {
        self.slow_call_rate_threshold = percent;
        self
    }

    /// Sets the duration above which a call counts as slow.
    pub fn slow_call_duration_threshold(mut self, threshold: Duration) -> Self {
        self.slow_call_duration_threshold = threshold;
        self
    }

    /// Sets the predicate deciding whether an operation error counts as a
    /// failure for rate accounting. Errors it rejects are recorded as
    /// successes but still returned to the caller.
    pub fn record_failure<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.record_failure = Arc::new(predicate);
        self
    }

    /// Enables or disables the timer-driven Open-to-HalfOpen transition.
    pub fn automatic_transition_from_open_to_half_open(mut self, enabled: bool) -> Self {
        self.automatic_open_to_half_open = enabled;
        self
    }

    /// Sets a constant wait interval in the Open state.
    pub fn wait_duration_in_open(mut self, wait: Duration) -> Self {
        self.wait_interval_fn = Arc::new(move |_| wait);
        self
    }

    /// Sets the wait interval in the Open state as a function of how many
    /// times the breaker has entered Open since it last closed.
    pub fn wait_interval_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) -> Duration + Send + Sync + 'static,
    {
        self.wait_interval_fn = Arc::new(f);
        self
    }

    /// Sets how many probe calls the HalfOpen state permits.
    pub fn permitted_number_of_calls_in_half_open(mut self, permitted: u32) -> Self {
        self.permitted_number_of_calls_in_half_open = permitted;
        self
    }

    /// Caps how long the breaker stays HalfOpen before being forced back to
    /// Open. `Duration::ZERO` disables the cap.
    pub fn max_wait_duration_in_half_open(mut self, max_wait: Duration) -> Self {
        self.max_wait_duration_in_half_open = max_wait;
        self
    }

    /// Builds the circuit breaker.
    pub fn build(self) -> CircuitBreaker<E> {
        let name = self.name.clone();
        CircuitBreaker::with_config(name, self.into_config())
    }

    /// Finalizes the configuration, clamping the window size to at least one
    /// slot and, for count windows, the minimum calls to the window size.
    pub(crate) fn into_config(self) -> Config<E> {
        let sliding_window_size = self.sliding_window_size.max(1);
        let minimum_number_of_calls = match self.sliding_window_kind {
            SlidingWindowKind::CountBased => self
                .minimum_number_of_calls
                .min(sliding_window_size as u64)
                .max(1),
            SlidingWindowKind::TimeBased => self.minimum_number_of_calls.max(1),
        };
        Config {
            sliding_window_kind: self.sliding_window_kind,
            sliding_window_size,
            minimum_number_of_calls,
            failure_rate_threshold: self.failure_rate_threshold,
            slow_call_rate_threshold: self.slow_call_rate_threshold,
            slow_call_duration_threshold: self.slow_call_duration_threshold,
            record_failure: self.record_failure,
            automatic_open_to_half_open: self.automatic_open_to_half_open,
            wait_interval_fn: self.wait_interval_fn,
            permitted_number_of_calls_in_half_open: self
                .permitted_number_of_calls_in_half_open
                .max(1),
            max_wait_duration_in_half_open: self.max_wait_duration_in_half_open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = BreakerBuilder::<Infallible>::new("defaults").into_config();
        assert_eq!(config.sliding_window_kind, SlidingWindowKind::CountBased);
        assert_eq!(config.sliding_window_size, 100);
        assert_eq!(config.minimum_number_of_calls, 100);
        assert_eq!(config.failure_rate_threshold, 50.0);
        assert_eq!(config.slow_call_rate_threshold, 100.0);
        assert_eq!(config.slow_call_duration_threshold, Duration::from_secs(60));
        assert!(!config.automatic_open_to_half_open);
        assert_eq!((config.wait_interval_fn)(1), Duration::from_secs(60));
        assert_eq!(config.permitted_number_of_calls_in_half_open, 10);
        assert_eq!(config.max_wait_duration_in_half_open, Duration::ZERO);
    }

    #[test]
    fn count_window_clamps_minimum_calls_to_size() {
        let config = BreakerBuilder::<Infallible>::new("clamp")
            .sliding_window(SlidingWindowKind::CountBased, 10, 500)
            .into_config();
        assert_eq!(config.minimum_number_of_calls, 10);
    }

    #[test]
    fn time_window_keeps_minimum_calls() {
        let config = BreakerBuilder::<Infallible>::new("time")
            .sliding_window(SlidingWindowKind::TimeBased, 10, 500)
            .into_config();
        assert_eq!(config.minimum_number_of_calls, 500);
    }

    #[test]
    fn window_size_floors_at_one() {
        let config = BreakerBuilder::<Infallible>::new("floor")
            .sliding_window(SlidingWindowKind::CountBased, 0, 0)
            .into_config();
        assert_eq!(config.sliding_window_size, 1);
        assert_eq!(config.minimum_number_of_calls, 1);
    }

    #[test]
    fn wait_interval_fn_sees_the_attempt_count() {
        let config = BreakerBuilder::<Infallible>::new("backoff")
            .wait_interval_fn(|attempt| Duration::from_secs(attempt))
            .into_config();
        assert_eq!((config.wait_interval_fn)(3), Duration::from_secs(3));
    }
}
