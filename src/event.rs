//! Typed event stream for circuit breaker observability.
//!
//! Consumers register per event category and are invoked on detached
//! threads, one per consumer, so a slow or panicking consumer can neither
//! block nor crash the breaker. The event stream is purely observational and
//! never sits on the admission-decision path.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use crate::state::StateName;

/// An event published by a circuit breaker.
#[derive(Debug, Clone)]
pub struct Event {
    name: Arc<str>,
    created_at: SystemTime,
    kind: EventKind,
}

impl Event {
    pub(crate) fn new(name: Arc<str>, kind: EventKind) -> Self {
        Self {
            name,
            created_at: SystemTime::now(),
            kind,
        }
    }

    /// Name of the breaker that published this event.
    pub fn breaker_name(&self) -> &str {
        &self.name
    }

    /// Wall-clock instant the event was created.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// The event payload.
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }
}

/// Payload of an [`Event`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A guarded call completed and was classified as a success.
    Success {
        /// Measured duration of the call.
        duration: Duration,
    },

    /// A guarded call completed and was classified as a failure.
    Error {
        /// Measured duration of the call.
        duration: Duration,
        /// The operation error (or panic payload) rendered to text.
        error: String,
    },

    /// A call was denied without being executed.
    NotPermitted,

    /// The breaker moved between states.
    StateTransition {
        /// State before the transition.
        from: StateName,
        /// State after the transition.
        to: StateName,
    },

    /// The failure rate reached its configured threshold.
    FailureRateExceeded {
        /// The failure rate at the moment the threshold was crossed.
        rate: f32,
    },

    /// The slow-call rate reached its configured threshold.
    SlowCallRateExceeded {
        /// The slow-call rate at the moment the threshold was crossed.
        rate: f32,
    },
}

type Consumer = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Registration surface for event consumers.
///
/// Obtained from [`CircuitBreaker::event_listener`](crate::CircuitBreaker::event_listener).
pub struct EventListener {
    on_success: RwLock<Vec<Consumer>>,
    on_error: RwLock<Vec<Consumer>>,
    on_not_permitted: RwLock<Vec<Consumer>>,
    on_state_transition: RwLock<Vec<Consumer>>,
    on_failure_rate_exceeded: RwLock<Vec<Consumer>>,
    on_slow_call_rate_exceeded: RwLock<Vec<Consumer>>,
}

impl EventListener {
    pub(crate) fn new() -> Self {
        Self {
            on_success: RwLock::new(Vec::new()),
            on_error: RwLock::new(Vec::new()),
            on_not_permitted: RwLock::new(Vec::new()),
            on_state_transition: RwLock::new(Vec::new()),
            on_failure_rate_exceeded: RwLock::new(Vec::new()),
            on_slow_call_rate_exceeded: RwLock::new(Vec::new()),
        }
    }

    /// Registers a consumer for success events.
    pub fn on_success<F>(&self, consumer: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.on_success.write().push(Arc::new(consumer));
    }

    /// Registers a consumer for error events.
    pub fn on_error<F>(&self, consumer: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.on_error.write().push(Arc::new(consumer));
    }

    /// Registers a consumer for not-permitted events.
    pub fn on_not_permitted<F>(&self, consumer: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.on_not_permitted.write().push(Arc::new(consumer));
    }

    /// Registers a consumer for state-transition events.
    pub fn on_state_transition<F>(&self, consumer: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.on_state_transition.write().push(Arc::new(consumer));
    }

    /// Registers a consumer for failure-rate-exceeded events.
    pub fn on_failure_rate_exceeded<F>(&self, consumer: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.on_failure_rate_exceeded.write().push(Arc::new(consumer));
    }

    /// Registers a consumer for slow-call-rate-exceeded events.
    pub fn on_slow_call_rate_exceeded<F>(&self, consumer: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.on_slow_call_rate_exceeded.write().push(Arc::new(consumer));
    }

    /// Dispatches an event to every consumer registered for its category.
    ///
    /// Fire-and-forget: returns as soon as the dispatch threads are spawned.
    pub(crate) fn publish(&self, event: Event) {
        let consumers = match &event.kind {
            EventKind::Success { .. } => &self.on_success,
            EventKind::Error { .. } => &self.on_error,
            EventKind::NotPermitted => &self.on_not_permitted,
            EventKind::StateTransition { .. } => &self.on_state_transition,
            EventKind::FailureRateExceeded { .. } => &self.on_failure_rate_exceeded,
            EventKind::SlowCallRateExceeded { .. } => &self.on_slow_call_rate_exceeded,
        }
        .read()
        .clone();

        for consumer in consumers {
            let event = event.clone();
            let _ = thread::Builder::new()
                .name("fusegate-event".to_string())
                .spawn(move || {
                    let _ = catch_unwind(AssertUnwindSafe(|| consumer(&event)));
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn consumers_receive_their_category() {
        let listener = EventListener::new();
        let (tx, rx) = mpsc::channel();
        listener.on_success(move |event| {
            tx.send(event.kind().clone()).unwrap();
        });

        listener.publish(Event::new(
            Arc::from("test"),
            EventKind::Success {
                duration: Duration::from_millis(3),
            },
        ));

        let kind = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            kind,
            EventKind::Success {
                duration: Duration::from_millis(3)
            }
        );
    }

    #[test]
    fn other_categories_stay_silent() {
        let listener = EventListener::new();
        let (tx, rx) = mpsc::channel();
        listener.on_error(move |event| {
            tx.send(event.kind().clone()).unwrap();
        });

        listener.publish(Event::new(Arc::from("test"), EventKind::NotPermitted));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn panicking_consumer_does_not_disturb_others() {
        let listener = EventListener::new();
        listener.on_not_permitted(|_| panic!("misbehaving consumer"));
        let (tx, rx) = mpsc::channel();
        listener.on_not_permitted(move |event| {
            tx.send(event.breaker_name().to_string()).unwrap();
        });

        listener.publish(Event::new(Arc::from("test"), EventKind::NotPermitted));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "test");
    }
}
