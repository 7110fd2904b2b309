//! State variants of the circuit breaker state machine.

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::metrics::MetricsRecorder;
use crate::timer::TimerToken;

/// The name of a circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateName {
    /// Normal operation; every call is permitted and recorded.
    Closed,

    /// Calls are denied until the wait interval elapses.
    Open,

    /// A limited number of probe calls test whether the dependency
    /// recovered.
    HalfOpen,

    /// Administrative bypass: every call is permitted, nothing is recorded.
    Disabled,

    /// Administrative lockout: every call is denied, nothing is recorded.
    ForcedOpen,
}

impl StateName {
    /// Canonical upper-case rendering used in error messages and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            StateName::Closed => "CLOSED",
            StateName::Open => "OPEN",
            StateName::HalfOpen => "HALF_OPEN",
            StateName::Disabled => "DISABLED",
            StateName::ForcedOpen => "FORCED_OPEN",
        }
    }
}

impl Display for StateName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One installed state of the machine.
///
/// A `State` is immutable once another state is installed in its place; each
/// transition constructs a fresh one. The `decided` flag is the one-shot
/// guard ensuring a threshold-driven transition fires at most once per state
/// instance no matter how many concurrent calls observe the condition.
#[derive(Debug)]
pub(crate) struct State {
    pub(crate) name: StateName,
    pub(crate) allow_publish: bool,
    pub(crate) attempts: u64,
    pub(crate) metrics: Arc<MetricsRecorder>,
    decided: AtomicBool,
    pub(crate) data: StateData,
}

/// Per-variant data.
#[derive(Debug)]
pub(crate) enum StateData {
    Closed,
    Open {
        entered_at: Instant,
        wait_duration: Duration,
        timer: Option<TimerToken>,
    },
    HalfOpen {
        permits: AtomicU32,
        timer: Option<TimerToken>,
    },
    Disabled,
    ForcedOpen,
}

impl State {
    pub(crate) fn closed<E>(config: &Config<E>) -> Self {
        Self {
            name: StateName::Closed,
            allow_publish: true,
            attempts: 0,
            metrics: Arc::new(MetricsRecorder::for_closed(config)),
            decided: AtomicBool::new(false),
            data: StateData::Closed,
        }
    }

    /// Open carries the outgoing state's recorder so the window that caused
    /// the trip stays readable while the breaker is open.
    pub(crate) fn open(
        attempts: u64,
        wait_duration: Duration,
        metrics: Arc<MetricsRecorder>,
        timer: Option<TimerToken>,
    ) -> Self {
        Self {
            name: StateName::Open,
            allow_publish: true,
            attempts,
            metrics,
            decided: AtomicBool::new(false),
            data: StateData::Open {
                entered_at: Instant::now(),
                wait_duration,
                timer,
            },
        }
    }

    pub(crate) fn half_open<E>(
        config: &Config<E>,
        attempts: u64,
        timer: Option<TimerToken>,
    ) -> Self {
        Self {
            name: StateName::HalfOpen,
            allow_publish: true,
            attempts,
            metrics: Arc::new(MetricsRecorder::for_half_open(config)),
            decided: AtomicBool::new(false),
            data: StateData::HalfOpen {
                permits: AtomicU32::new(config.permitted_number_of_calls_in_half_open.max(1)),
                timer,
            },
        }
    }

    pub(crate) fn disabled<E>(config: &Config<E>, attempts: u64) -> Self {
        Self {
            name: StateName::Disabled,
            allow_publish: false,
            attempts,
            metrics: Arc::new(MetricsRecorder::for_static(config)),
            decided: AtomicBool::new(false),
            data: StateData::Disabled,
        }
    }

    pub(crate) fn forced_open<E>(config: &Config<E>, attempts: u64) -> Self {
        Self {
            name: StateName::ForcedOpen,
            allow_publish: false,
            attempts,
            metrics: Arc::new(MetricsRecorder::for_static(config)),
            decided: AtomicBool::new(false),
            data: StateData::ForcedOpen,
        }
    }

    /// Claims this state's one-shot transition decision.
    pub(crate) fn try_decide(&self) -> bool {
        !self.decided.swap(true, Ordering::AcqRel)
    }

    /// Takes one half-open probe permit; the counter floors at zero.
    pub(crate) fn try_take_permit(&self) -> bool {
        match &self.data {
            StateData::HalfOpen { permits, .. } => permits
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok(),
            _ => true,
        }
    }

    /// Whether an Open state has outlived its wait interval.
    pub(crate) fn open_wait_elapsed(&self) -> bool {
        match &self.data {
            StateData::Open {
                entered_at,
                wait_duration,
                ..
            } => entered_at.elapsed() >= *wait_duration,
            _ => false,
        }
    }

    /// Pre-transition hook: cancels any pending automatic-transition timer.
    pub(crate) fn cancel_timer(&self) {
        match &self.data {
            StateData::Open {
                timer: Some(timer), ..
            }
            | StateData::HalfOpen {
                timer: Some(timer), ..
            } => timer.cancel(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerBuilder;
    use std::convert::Infallible;

    fn config() -> Config<Infallible> {
        BreakerBuilder::<Infallible>::new("state")
            .permitted_number_of_calls_in_half_open(2)
            .into_config()
    }

    #[test]
    fn state_names_render_upper_snake() {
        assert_eq!(StateName::Closed.to_string(), "CLOSED");
        assert_eq!(StateName::Open.to_string(), "OPEN");
        assert_eq!(StateName::HalfOpen.to_string(), "HALF_OPEN");
        assert_eq!(StateName::Disabled.to_string(), "DISABLED");
        assert_eq!(StateName::ForcedOpen.to_string(), "FORCED_OPEN");
    }

    #[test]
    fn half_open_permits_floor_at_zero() {
        let state = State::half_open(&config(), 1, None);
        assert!(state.try_take_permit());
        assert!(state.try_take_permit());
        assert!(!state.try_take_permit());
        assert!(!state.try_take_permit());
    }

    #[test]
    fn decision_flag_is_one_shot() {
        let state = State::closed(&config());
        assert!(state.try_decide());
        assert!(!state.try_decide());
    }

    #[test]
    fn open_wait_elapses() {
        let config = config();
        let metrics = Arc::new(MetricsRecorder::for_closed(&config));
        let state = State::open(1, Duration::from_millis(0), metrics, None);
        assert!(state.open_wait_elapsed());

        let metrics = Arc::new(MetricsRecorder::for_closed(&config));
        let waiting = State::open(1, Duration::from_secs(60), metrics, None);
        assert!(!waiting.open_wait_elapsed());
    }
}
