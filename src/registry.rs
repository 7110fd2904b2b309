//! Named registry of circuit breakers.
//!
//! A breaker is created once per name and lives for the process lifetime of
//! that name; every caller asking for the same name shares the same breaker.

use ahash::RandomState;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use crate::breaker::CircuitBreaker;
use crate::config::BreakerBuilder;
use crate::error::DynError;

/// A name-keyed collection of circuit breakers sharing one error type.
pub struct BreakerRegistry<E> {
    breakers: RwLock<HashMap<Arc<str>, CircuitBreaker<E>, RandomState>>,
}

impl<E> BreakerRegistry<E>
where
    E: Error + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            breakers: RwLock::new(HashMap::default()),
        }
    }

    /// Returns the breaker registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<CircuitBreaker<E>> {
        self.breakers.read().get(name).cloned()
    }

    /// Returns the breaker registered under `name`, creating one with
    /// default settings if absent.
    pub fn get_or_create(&self, name: &str) -> CircuitBreaker<E> {
        self.get_or_build(name, |builder| builder)
    }

    /// Returns the breaker registered under `name`, creating one via
    /// `configure` if absent. The closure is only invoked on creation.
    pub fn get_or_build<F>(&self, name: &str, configure: F) -> CircuitBreaker<E>
    where
        F: FnOnce(BreakerBuilder<E>) -> BreakerBuilder<E>,
    {
        if let Some(existing) = self.get(name) {
            return existing;
        }
        let mut breakers = self.breakers.write();
        breakers
            .entry(Arc::from(name))
            .or_insert_with(|| configure(CircuitBreaker::builder(name)).build())
            .clone()
    }

    /// Removes and returns the breaker registered under `name`.
    pub fn remove(&self, name: &str) -> Option<CircuitBreaker<E>> {
        self.breakers.write().remove(name)
    }

    /// Snapshot of every registered breaker, for exporter-style polling.
    pub fn all(&self) -> Vec<CircuitBreaker<E>> {
        self.breakers.read().values().cloned().collect()
    }
}

impl<E> Default for BreakerRegistry<E>
where
    E: Error + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_REGISTRY: Lazy<BreakerRegistry<DynError>> = Lazy::new(BreakerRegistry::new);

/// The process-wide default registry, keyed over type-erased errors.
pub fn default_registry() -> &'static BreakerRegistry<DynError> {
    &DEFAULT_REGISTRY
}
