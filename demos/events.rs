use fusegate::{CircuitBreaker, EventKind, SlidingWindowKind};
use std::error::Error;
use std::fmt;
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

fn main() {
    let breaker = CircuitBreaker::<ServiceError>::builder("orders")
        .sliding_window(SlidingWindowKind::CountBased, 4, 4)
        .automatic_transition_from_open_to_half_open(true)
        .wait_duration_in_open(Duration::from_secs(1))
        .permitted_number_of_calls_in_half_open(2)
        .build();

    // Subscribe to the full event stream
    let listener = breaker.event_listener();
    listener.on_state_transition(|event| {
        if let EventKind::StateTransition { from, to } = event.kind() {
            println!("[event] {} moved {} -> {}", event.breaker_name(), from, to);
        }
    });
    listener.on_failure_rate_exceeded(|event| {
        if let EventKind::FailureRateExceeded { rate } = event.kind() {
            println!("[event] failure rate crossed the threshold at {:.1}%", rate);
        }
    });
    listener.on_error(|event| {
        if let EventKind::Error { duration, error } = event.kind() {
            println!("[event] call failed after {:?}: {}", duration, error);
        }
    });
    listener.on_not_permitted(|event| {
        println!("[event] {} denied a call", event.breaker_name());
    });

    // Trip the breaker with a burst of failures
    for _ in 0..4 {
        let _ = breaker.call(|| Err::<(), _>(ServiceError("connection refused".into())));
    }

    // This call is denied while the breaker is open
    let _ = breaker.call(|| Ok::<_, ServiceError>(()));

    // Wait for the automatic transition to half-open, then recover
    thread::sleep(Duration::from_millis(1500));
    for _ in 0..2 {
        let _ = breaker.call(|| Ok::<_, ServiceError>(()));
    }

    // Give the event dispatch threads a moment to drain
    thread::sleep(Duration::from_millis(200));
    println!("final state: {}", breaker.state());
}
