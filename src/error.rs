//! Error types for the circuit breaker library.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use crate::state::StateName;

/// Result type for guarded calls.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Error returned by a guarded call.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The current state denied the call before it ran.
    NotPermitted(NotPermittedError),

    /// The guarded operation itself failed.
    Operation(E),
}

impl<E> From<NotPermittedError> for BreakerError<E> {
    fn from(denied: NotPermittedError) -> Self {
        BreakerError::NotPermitted(denied)
    }
}

impl<E> Display for BreakerError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::NotPermitted(denied) => Display::fmt(denied, f),
            BreakerError::Operation(e) => write!(f, "Operation error: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BreakerError::NotPermitted(denied) => Some(denied),
            BreakerError::Operation(e) => Some(e),
        }
    }
}

/// Admission denial: the breaker's current state does not permit calls.
///
/// Expected and frequent under load shedding; carries the denying state so
/// callers can distinguish an open circuit from an exhausted half-open probe
/// budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotPermittedError {
    name: Arc<str>,
    state: StateName,
}

impl NotPermittedError {
    pub(crate) fn new(name: Arc<str>, state: StateName) -> Self {
        Self { name, state }
    }

    /// Name of the breaker that denied the call.
    pub fn breaker_name(&self) -> &str {
        &self.name
    }

    /// The state that denied the call.
    pub fn state(&self) -> StateName {
        self.state
    }
}

impl Display for NotPermittedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CircuitBreaker '{}' is {} and does not permit further calls",
            self.name, self.state
        )
    }
}

impl Error for NotPermittedError {}

/// A requested state transition is not allowed from the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransitionError {
    name: Arc<str>,
    from: StateName,
    to: StateName,
}

impl IllegalTransitionError {
    pub(crate) fn new(name: Arc<str>, from: StateName, to: StateName) -> Self {
        Self { name, from, to }
    }

    /// Name of the breaker that rejected the transition.
    pub fn breaker_name(&self) -> &str {
        &self.name
    }

    /// The state the breaker was in when the transition was requested.
    pub fn from_state(&self) -> StateName {
        self.from
    }

    /// The state the transition was aiming for.
    pub fn to_state(&self) -> StateName {
        self.to
    }
}

impl Display for IllegalTransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CircuitBreaker '{}' tried an illegal state transition from {} to {}",
            self.name, self.from, self.to
        )
    }
}

impl Error for IllegalTransitionError {}

/// Type-erased operation error.
///
/// Useful when one breaker guards call sites with different error types,
/// such as entries in the process-wide default registry.
#[derive(Debug)]
pub struct DynError(Box<dyn Error + Send + Sync>);

impl DynError {
    /// Wraps any error in a type-erased box.
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self(Box::new(error))
    }
}

impl From<Box<dyn Error + Send + Sync>> for DynError {
    fn from(error: Box<dyn Error + Send + Sync>) -> Self {
        Self(error)
    }
}

impl Display for DynError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Error for DynError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.0.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_permitted_message_names_breaker_and_state() {
        let denied = NotPermittedError::new(Arc::from("test"), StateName::Open);
        assert_eq!(
            denied.to_string(),
            "CircuitBreaker 'test' is OPEN and does not permit further calls"
        );
    }

    #[test]
    fn illegal_transition_message_names_both_states() {
        let illegal =
            IllegalTransitionError::new(Arc::from("x"), StateName::Closed, StateName::HalfOpen);
        assert_eq!(
            illegal.to_string(),
            "CircuitBreaker 'x' tried an illegal state transition from CLOSED to HALF_OPEN"
        );
    }

    #[test]
    fn dyn_error_preserves_the_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket reset");
        let wrapped = DynError::new(io);
        assert_eq!(wrapped.to_string(), "socket reset");
        assert!(wrapped.source().is_some());
    }
}
