//! Core circuit breaker state machine.

use std::any::Any;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::config::{BreakerBuilder, Config};
use crate::error::{BreakerError, BreakerResult, IllegalTransitionError, NotPermittedError};
use crate::event::{Event, EventKind, EventListener};
use crate::metrics::{Metrics, ThresholdCheck};
use crate::state::{State, StateData, StateName};
use crate::timer::TimerToken;

/// Shared core of a circuit breaker.
///
/// The current state lives in a single swappable cell; all transitions go
/// through an optimistic compare-and-swap loop over it and everything else
/// reads it without blocking writers for longer than the pointer swap.
struct BreakerInner<E> {
    name: Arc<str>,
    config: Config<E>,
    state: RwLock<Arc<State>>,
    listener: EventListener,
}

/// A circuit breaker guarding calls against a failing dependency.
///
/// Outcomes and latencies are aggregated over a sliding window; when the
/// failure or slow-call rate crosses its threshold the breaker opens and
/// denies calls until a wait interval has elapsed, then probes recovery
/// through a half-open state. Cloning is cheap and every clone observes the
/// same breaker.
pub struct CircuitBreaker<E> {
    inner: Arc<BreakerInner<E>>,
}

impl<E> Clone for CircuitBreaker<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> CircuitBreaker<E>
where
    E: std::error::Error + 'static,
{
    /// Creates a breaker named `name` with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    /// Creates a builder for customizing a breaker named `name`.
    pub fn builder(name: impl Into<String>) -> BreakerBuilder<E> {
        BreakerBuilder::new(name)
    }

    pub(crate) fn with_config(name: String, config: Config<E>) -> Self {
        let initial = Arc::new(State::closed(&config));
        Self {
            inner: Arc::new(BreakerInner {
                name: Arc::from(name),
                config,
                state: RwLock::new(initial),
                listener: EventListener::new(),
            }),
        }
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The name of the current state.
    pub fn state(&self) -> StateName {
        self.current().name
    }

    /// Read-only metrics of the current state's window.
    pub fn metrics(&self) -> Metrics {
        self.current().metrics.metrics()
    }

    /// Registration surface for event consumers.
    pub fn event_listener(&self) -> &EventListener {
        &self.inner.listener
    }

    fn current(&self) -> Arc<State> {
        self.inner.state.read().clone()
    }

    /// Executes `f` under the breaker's protection.
    ///
    /// If the current state denies admission, `f` is never invoked and
    /// [`BreakerError::NotPermitted`] is returned. Otherwise `f` runs with
    /// its duration measured; the outcome is classified by the failure
    /// predicate and recorded into the current state's window. A panic
    /// inside `f` is captured, recorded as a failure, and then re-raised to
    /// the caller with its original payload.
    pub fn call<F, T>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.acquire_permission()?;

        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(f));
        let duration = start.elapsed();

        match outcome {
            Ok(result) => {
                self.record_result(&result, duration);
                result.map_err(BreakerError::Operation)
            }
            Err(payload) => {
                self.on_error(duration, panic_message(payload.as_ref()));
                resume_unwind(payload)
            }
        }
    }

    /// Executes an async operation under the breaker's protection.
    ///
    /// Same protocol as [`call`](Self::call), including panic capture and
    /// re-raise.
    #[cfg(feature = "async")]
    pub async fn call_async<F, Fut, T>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        use futures::FutureExt;

        self.acquire_permission()?;

        let start = Instant::now();
        let outcome = AssertUnwindSafe(f()).catch_unwind().await;
        let duration = start.elapsed();

        match outcome {
            Ok(result) => {
                self.record_result(&result, duration);
                result.map_err(BreakerError::Operation)
            }
            Err(payload) => {
                self.on_error(duration, panic_message(payload.as_ref()));
                resume_unwind(payload)
            }
        }
    }

    fn record_result<T>(&self, result: &Result<T, E>, duration: Duration) {
        match result {
            Ok(_) => self.on_success(duration),
            Err(error) => {
                if (self.inner.config.record_failure)(error) {
                    self.on_error(duration, error.to_string());
                } else {
                    self.on_success(duration);
                }
            }
        }
    }

    /// Asks the current state for permission to run one call.
    ///
    /// Closed and Disabled always permit; ForcedOpen always denies; Open
    /// denies until its wait interval has elapsed, then moves to HalfOpen
    /// and re-evaluates; HalfOpen permits while probe permits remain.
    pub fn acquire_permission(&self) -> Result<(), NotPermittedError> {
        loop {
            let state = self.current();
            match &state.data {
                StateData::Closed | StateData::Disabled => return Ok(()),
                StateData::ForcedOpen => return Err(self.deny(&state)),
                StateData::Open { .. } => {
                    if state.open_wait_elapsed() {
                        let _ = self.transition_to_half_open();
                        continue;
                    }
                    return Err(self.deny(&state));
                }
                StateData::HalfOpen { .. } => {
                    if state.try_take_permit() {
                        return Ok(());
                    }
                    return Err(self.deny(&state));
                }
            }
        }
    }

    fn deny(&self, state: &State) -> NotPermittedError {
        state.metrics.on_call_not_permitted();
        self.publish(EventKind::NotPermitted);
        NotPermittedError::new(self.inner.name.clone(), state.name)
    }

    fn on_success(&self, duration: Duration) {
        let state = self.current();
        if state.allow_publish {
            self.publish(EventKind::Success { duration });
        }
        match &state.data {
            StateData::Closed => {
                let check = state.metrics.on_success(duration);
                self.react_closed(&state, check);
            }
            StateData::HalfOpen { .. } => {
                let check = state.metrics.on_success(duration);
                self.react_half_open(&state, check);
            }
            StateData::Open { .. } => {
                let _ = state.metrics.on_success(duration);
            }
            StateData::Disabled | StateData::ForcedOpen => {}
        }
    }

    fn on_error(&self, duration: Duration, error: String) {
        let state = self.current();
        if state.allow_publish {
            self.publish(EventKind::Error { duration, error });
        }
        match &state.data {
            StateData::Closed => {
                let check = state.metrics.on_error(duration);
                self.react_closed(&state, check);
            }
            StateData::HalfOpen { .. } => {
                let check = state.metrics.on_error(duration);
                self.react_half_open(&state, check);
            }
            StateData::Open { .. } => {
                let _ = state.metrics.on_error(duration);
            }
            StateData::Disabled | StateData::ForcedOpen => {}
        }
    }

    fn react_closed(&self, state: &Arc<State>, check: ThresholdCheck) {
        if check.is_exceeded() && state.try_decide() {
            self.publish_exceeded(check);
            let _ = self.transition_to_open();
        }
    }

    fn react_half_open(&self, state: &Arc<State>, check: ThresholdCheck) {
        if check.is_exceeded() {
            if state.try_decide() {
                self.publish_exceeded(check);
                let _ = self.transition_to_open();
            }
        } else if check == ThresholdCheck::BelowThresholds && state.try_decide() {
            let _ = self.transition_to_closed();
        }
    }

    fn publish_exceeded(&self, check: ThresholdCheck) {
        match check {
            ThresholdCheck::FailureRateExceeded { failure_rate } => {
                self.publish(EventKind::FailureRateExceeded { rate: failure_rate });
            }
            ThresholdCheck::SlowCallRateExceeded { slow_call_rate } => {
                self.publish(EventKind::SlowCallRateExceeded {
                    rate: slow_call_rate,
                });
            }
            ThresholdCheck::AboveThresholds {
                failure_rate,
                slow_call_rate,
            } => {
                self.publish(EventKind::FailureRateExceeded { rate: failure_rate });
                self.publish(EventKind::SlowCallRateExceeded {
                    rate: slow_call_rate,
                });
            }
            _ => {}
        }
    }

    /// Transitions to the Closed state, resetting metrics and attempts.
    pub fn transition_to_closed(&self) -> Result<(), IllegalTransitionError> {
        self.transition_to(StateName::Closed)
    }

    /// Transitions to the Open state, incrementing the attempt count.
    pub fn transition_to_open(&self) -> Result<(), IllegalTransitionError> {
        self.transition_to(StateName::Open)
    }

    /// Transitions to the HalfOpen state. Illegal directly from Closed.
    pub fn transition_to_half_open(&self) -> Result<(), IllegalTransitionError> {
        self.transition_to(StateName::HalfOpen)
    }

    /// Transitions to the administrative Disabled state.
    pub fn transition_to_disabled(&self) -> Result<(), IllegalTransitionError> {
        self.transition_to(StateName::Disabled)
    }

    /// Transitions to the administrative ForcedOpen state.
    pub fn transition_to_forced_open(&self) -> Result<(), IllegalTransitionError> {
        self.transition_to(StateName::ForcedOpen)
    }

    /// Optimistic transition protocol: read the current state, validate the
    /// move, construct the successor, swap only if the current state has not
    /// changed since the read, otherwise retry from a fresh read. The
    /// outgoing state's timer is cancelled after a winning swap and the new
    /// state's timer (if any) armed.
    fn transition_to(&self, target: StateName) -> Result<(), IllegalTransitionError> {
        loop {
            let current = self.current();
            if current.name == StateName::Closed && target == StateName::HalfOpen {
                return Err(IllegalTransitionError::new(
                    self.inner.name.clone(),
                    current.name,
                    target,
                ));
            }

            let (next, timer) = self.build_state(target, &current);
            if self.swap(&current, Arc::new(next)) {
                current.cancel_timer();
                if let Some((token, delay, timer_target)) = timer {
                    self.arm_timer(token, delay, timer_target);
                }
                self.publish(EventKind::StateTransition {
                    from: current.name,
                    to: target,
                });
                return Ok(());
            }
        }
    }

    fn swap(&self, expected: &Arc<State>, next: Arc<State>) -> bool {
        let mut cell = self.inner.state.write();
        if Arc::ptr_eq(&cell, expected) {
            *cell = next;
            true
        } else {
            false
        }
    }

    fn build_state(
        &self,
        target: StateName,
        current: &State,
    ) -> (State, Option<(TimerToken, Duration, StateName)>) {
        let config = &self.inner.config;
        match target {
            StateName::Closed => (State::closed(config), None),
            StateName::Open => {
                let attempts = current.attempts + 1;
                let wait = (config.wait_interval_fn)(attempts);
                let timer = config.automatic_open_to_half_open.then(TimerToken::new);
                let state = State::open(attempts, wait, current.metrics.clone(), timer.clone());
                (state, timer.map(|t| (t, wait, StateName::HalfOpen)))
            }
            StateName::HalfOpen => {
                let max_wait = config.max_wait_duration_in_half_open;
                let timer = (max_wait > Duration::ZERO).then(TimerToken::new);
                let state = State::half_open(config, current.attempts, timer.clone());
                (state, timer.map(|t| (t, max_wait, StateName::Open)))
            }
            StateName::Disabled => (State::disabled(config, current.attempts), None),
            StateName::ForcedOpen => (State::forced_open(config, current.attempts), None),
        }
    }

    /// Spawns the timer thread backing an automatic transition. The thread
    /// holds only a weak reference, so dropping the last breaker handle
    /// while a timer is pending lets the whole core deallocate.
    fn arm_timer(&self, token: TimerToken, delay: Duration, target: StateName) {
        let weak: Weak<BreakerInner<E>> = Arc::downgrade(&self.inner);
        let _ = thread::Builder::new()
            .name(format!("fusegate-timer-{}", self.inner.name))
            .spawn(move || {
                if token.wait_then_claim(delay) {
                    if let Some(inner) = weak.upgrade() {
                        let breaker = CircuitBreaker { inner };
                        let _ = breaker.transition_to(target);
                    }
                }
            });
    }

    fn publish(&self, kind: EventKind) {
        self.inner
            .listener
            .publish(Event::new(self.inner.name.clone(), kind));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "guarded call panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlidingWindowKind;
    use std::fmt;
    use std::sync::Barrier;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Test error: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn self_transition_rebuilds_the_state() {
        let breaker = CircuitBreaker::<TestError>::builder("self")
            .sliding_window(SlidingWindowKind::CountBased, 10, 10)
            .build();
        let _ = breaker.call(|| Ok::<_, TestError>(()));
        assert_eq!(breaker.metrics().number_of_calls(), 1);

        breaker.transition_to_closed().unwrap();
        assert_eq!(breaker.state(), StateName::Closed);
        assert_eq!(breaker.metrics().number_of_calls(), 0);
    }

    #[test]
    fn concurrent_transitions_settle_on_one_state() {
        let breaker = CircuitBreaker::<TestError>::new("race");
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let breaker = breaker.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    if i % 2 == 0 {
                        let _ = breaker.transition_to_open();
                    } else {
                        let _ = breaker.transition_to_closed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let settled = breaker.state();
        assert!(settled == StateName::Open || settled == StateName::Closed);
    }

    #[test]
    fn open_attempts_feed_the_wait_interval_fn() {
        let breaker = CircuitBreaker::<TestError>::builder("backoff")
            .wait_interval_fn(|attempt| Duration::from_millis(10 * attempt))
            .build();
        breaker.transition_to_open().unwrap();
        breaker.transition_to_half_open().unwrap();
        breaker.transition_to_open().unwrap();
        // Two entries into Open: the second wait is 20ms, so the breaker
        // still denies after 10ms but permits after the full interval.
        thread::sleep(Duration::from_millis(40));
        assert!(breaker.acquire_permission().is_ok());
        assert_eq!(breaker.state(), StateName::HalfOpen);
    }

    #[cfg(feature = "async")]
    mod async_tests {
        use super::*;

        #[test]
        fn call_async_records_and_returns() {
            let breaker = CircuitBreaker::<TestError>::builder("async")
                .sliding_window(SlidingWindowKind::CountBased, 4, 4)
                .build();

            tokio_test::block_on(async {
                let ok = breaker.call_async(|| async { Ok::<_, TestError>(7) }).await;
                assert_eq!(ok.unwrap(), 7);

                let err = breaker
                    .call_async(|| async { Err::<(), _>(TestError("down")) })
                    .await;
                assert!(matches!(err, Err(BreakerError::Operation(_))));
            });

            let metrics = breaker.metrics();
            assert_eq!(metrics.number_of_calls(), 2);
            assert_eq!(metrics.number_of_failed_calls(), 1);
        }
    }
}
