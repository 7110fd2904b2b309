//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use fusegate::prelude::*;
//! ```

pub use crate::breaker::CircuitBreaker;
pub use crate::config::{BreakerBuilder, SlidingWindowKind};
pub use crate::error::{BreakerError, BreakerResult, NotPermittedError};
pub use crate::event::{Event, EventKind};
pub use crate::metrics::Metrics;
pub use crate::state::StateName;
