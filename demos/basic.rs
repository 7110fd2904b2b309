use fusegate::{BreakerError, CircuitBreaker, SlidingWindowKind};
use std::error::Error;
use std::fmt;
use std::thread;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

fn main() {
    // Create a circuit breaker sized for a quick demonstration
    let breaker = CircuitBreaker::<ServiceError>::builder("backend")
        .sliding_window(SlidingWindowKind::CountBased, 4, 4)
        .failure_rate_threshold(50.0) // 50% failure rate trips the circuit
        .wait_duration_in_open(Duration::from_secs(2)) // 2 second cooldown
        .permitted_number_of_calls_in_half_open(2) // 2 probe calls while recovering
        .build();

    println!("Circuit initial state: {}", breaker.state());

    // Create a mutable counter for tracking failures
    let mut call_counter = 0u32;

    // Simulated flaky service: fails every other call for a while, then recovers
    let call_service = |counter: &mut u32| -> Result<String, ServiceError> {
        *counter += 1;
        if *counter <= 8 && *counter % 2 == 0 {
            Err(ServiceError("External service error".to_string()))
        } else {
            Ok("Success".to_string())
        }
    };

    // Make 15 calls with the circuit breaker
    for i in 1..=15 {
        println!("\nAttempt {}: ", i);

        match breaker.call(|| call_service(&mut call_counter)) {
            Ok(result) => println!("Call succeeded with result: {}", result),
            Err(BreakerError::NotPermitted(denied)) => {
                println!("{}; waiting before retry...", denied);
                thread::sleep(Duration::from_secs(1));
            }
            Err(BreakerError::Operation(err)) => {
                println!("Call failed with error: {}", err);
            }
        }

        let metrics = breaker.metrics();
        println!(
            "Current state: {}, failure rate: {:.2}, calls in window: {}",
            breaker.state(),
            metrics.failure_rate(),
            metrics.number_of_calls()
        );

        // Add a small delay between calls
        thread::sleep(Duration::from_millis(300));
    }
}
