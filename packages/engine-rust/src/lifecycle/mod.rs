//! Initialiser scope lifecycle.
//!
//! Expressions evaluated while a delegate is built need an [`Event`] to read
//! from. The hosting runtime supplies these through an
//! [`InitialiserScopeProvider`]; [`InitialiserScope`] pairs every
//! acquisition with exactly one completion, on every exit path.

pub mod scope_registry;

use opforge_core::Event;

pub use scope_registry::ScopeRegistry;

/// The hosting runtime could not provide an initialiser scope.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("initialiser scope limit of {limit} reached")]
    Exhausted { limit: usize },
    #[error("initialiser scope unavailable: {0}")]
    Unavailable(String),
}

/// Outbound contract with the lifecycle subsystem.
///
/// `complete` is called exactly once for every event returned by `acquire`.
pub trait InitialiserScopeProvider: Send + Sync {
    /// Manufactures an event used only while a delegate is built.
    ///
    /// # Errors
    ///
    /// Returns `ScopeError` if no scope can be created.
    fn acquire(&self) -> Result<Event, ScopeError>;

    /// Marks the event's scope as successfully completed and frees whatever
    /// it held.
    fn complete(&self, event: &Event);
}

/// RAII guard over an acquired initialiser event.
///
/// Dropping the guard completes the scope, so completion happens once whether
/// the build succeeds, fails, or unwinds.
pub struct InitialiserScope<'p> {
    provider: &'p dyn InitialiserScopeProvider,
    event: Event,
}

impl<'p> InitialiserScope<'p> {
    /// Acquires a scope from `provider`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's `ScopeError`; nothing needs completing then.
    pub fn acquire(provider: &'p dyn InitialiserScopeProvider) -> Result<Self, ScopeError> {
        let event = provider.acquire()?;
        Ok(Self { provider, event })
    }

    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }
}

impl Drop for InitialiserScope<'_> {
    fn drop(&mut self) {
        self.provider.complete(&self.event);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn guard_completes_on_drop() {
        let registry = ScopeRegistry::new(Arc::new(BTreeMap::new()));
        {
            let scope = InitialiserScope::acquire(&registry).unwrap();
            assert_eq!(registry.open_scopes(), 1);
            assert!(!scope.event().correlation_id().is_empty());
        }
        assert_eq!(registry.open_scopes(), 0);
        assert_eq!(registry.completed_count(), 1);
    }

    #[test]
    fn guard_completes_during_unwind() {
        let registry = ScopeRegistry::new(Arc::new(BTreeMap::new()));
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _scope = InitialiserScope::acquire(&registry).unwrap();
            panic!("build blew up");
        }));
        assert!(result.is_err());
        assert_eq!(registry.acquired_count(), 1);
        assert_eq!(registry.completed_count(), 1);
        assert_eq!(registry.open_scopes(), 0);
    }

    #[test]
    fn failed_acquire_completes_nothing() {
        let registry = ScopeRegistry::new(Arc::new(BTreeMap::new())).with_limit(0);
        assert!(matches!(
            InitialiserScope::acquire(&registry),
            Err(ScopeError::Exhausted { limit: 0 })
        ));
        assert_eq!(registry.completed_count(), 0);
    }
}
