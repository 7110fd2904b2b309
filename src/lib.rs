//! # fusegate
//!
//! A production-grade, sliding-window circuit breaker library with lock-free
//! state transitions and typed event streams.
//!
//! This library provides concurrent-safe admission control for calls against
//! unreliable dependencies: every guarded call's outcome and latency is
//! aggregated over a sliding window, and when the failure rate or slow-call
//! rate crosses its configured threshold the breaker stops admitting calls,
//! later probing recovery through a half-open state.
//!
//! ## States
//!
//! - **Closed**: Normal operation. Calls pass through and are recorded; the
//!   breaker opens when a rate threshold is crossed.
//! - **Open**: Calls are rejected immediately. After the wait interval the
//!   next call (or an optional timer) moves the breaker to half-open.
//! - **HalfOpen**: A limited number of probe calls are permitted to check
//!   whether the dependency has recovered; their outcomes either close or
//!   re-open the breaker.
//! - **Disabled**: Administrative bypass. Every call is permitted and
//!   nothing is recorded.
//! - **ForcedOpen**: Administrative lockout. Every call is denied and
//!   nothing is recorded.
//!
//! ## Basic Usage
//!
//! ```rust
//! use fusegate::{BreakerError, CircuitBreaker, SlidingWindowKind};
//! use std::error::Error;
//! use std::fmt;
//! use std::time::Duration;
//!
//! // Define a custom error type that implements the Error trait
//! #[derive(Debug)]
//! struct ServiceError(String);
//!
//! impl fmt::Display for ServiceError {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
//!         write!(f, "Service error: {}", self.0)
//!     }
//! }
//!
//! impl Error for ServiceError {}
//!
//! // Create a circuit breaker with custom settings
//! let breaker = CircuitBreaker::<ServiceError>::builder("backend")
//!     .sliding_window(SlidingWindowKind::CountBased, 20, 10)
//!     .failure_rate_threshold(50.0) // Open when half the window failed
//!     .wait_duration_in_open(Duration::from_secs(30))
//!     .build();
//!
//! // Use the circuit breaker to wrap function calls
//! match breaker.call(|| {
//!     // Your service call that might fail
//!     Ok("Success".to_string()) // Simulate success
//!     // Err(ServiceError("Service unavailable".to_string())) // Or failure
//! }) {
//!     Ok(result) => println!("Call succeeded: {}", result),
//!     Err(BreakerError::NotPermitted(denied)) => {
//!         println!("Call was prevented: {}", denied)
//!     }
//!     Err(BreakerError::Operation(err)) => println!("Call failed: {}", err),
//! }
//! ```
//!
//! ## Observing the breaker
//!
//! Every breaker exposes a [`Metrics`] snapshot and a typed
//! [`EventListener`]; both are read-only surfaces that exporters can poll or
//! subscribe to without sitting on the admission path:
//!
//! ```rust
//! # use fusegate::CircuitBreaker;
//! # use fusegate::DynError;
//! let breaker = CircuitBreaker::<DynError>::new("backend");
//! breaker.event_listener().on_state_transition(|event| {
//!     eprintln!("{} changed state: {:?}", event.breaker_name(), event.kind());
//! });
//! assert_eq!(breaker.metrics().number_of_calls(), 0);
//! ```
//!
//! ## Async Support
//!
//! With the `async` feature enabled, the breaker guards futures too:
//!
//! ```rust,ignore
//! // Enable the "async" feature in Cargo.toml
//! let breaker = CircuitBreaker::<ServiceError>::new("backend");
//!
//! let result = breaker.call_async(|| async {
//!     // Your async service call
//!     Ok("Success".to_string())
//! }).await;
//! ```
//!
//! ## Features
//!
//! - `std` - Standard library support (default)
//! - `async` - Async call decoration with Tokio

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod config;
mod error;
mod event;
mod metrics;
pub mod prelude;
mod registry;
mod state;
mod timer;
mod window;

// Re-exports
pub use breaker::CircuitBreaker;
pub use config::{BreakerBuilder, SlidingWindowKind};
pub use error::{BreakerError, BreakerResult, DynError, IllegalTransitionError, NotPermittedError};
pub use event::{Event, EventKind, EventListener};
pub use metrics::Metrics;
pub use registry::{default_registry, BreakerRegistry};
pub use state::StateName;
