use std::any::type_name;
use std::sync::Arc;

use opforge_core::{OperationModel, ParameterMap};
use tracing::{debug, warn};

use super::error::{ConfigurationError, ConstructionError};
use super::executor::{BlockingExecutor, Executor, NonBlockingExecutor};
use super::method::OperationMethod;
use crate::builder::{DefaultObjectBuilder, OperationDelegate, ReflectionCache};
use crate::lifecycle::{InitialiserScope, InitialiserScopeProvider};
use crate::resolver::{resolver_for, ValueResolvingContext};

/// Builds a fresh delegate of type `T` for every execution request and wraps
/// it in the executor matching the operation's execution mode.
///
/// Nothing is cached between calls except the per-type property metadata in
/// the shared [`ReflectionCache`].
pub struct ReflectiveOperationExecutorFactory<T: OperationDelegate> {
    method: OperationMethod<T>,
    cache: Arc<ReflectionCache>,
    scopes: Arc<dyn InitialiserScopeProvider>,
}

impl<T: OperationDelegate> ReflectiveOperationExecutorFactory<T> {
    #[must_use]
    pub fn new(method: OperationMethod<T>, scopes: Arc<dyn InitialiserScopeProvider>) -> Self {
        Self {
            method,
            cache: Arc::new(ReflectionCache::new()),
            scopes,
        }
    }

    /// Creates a factory and checks that `method` supports the model's
    /// declared execution mode.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::ModeMismatch` when they disagree.
    pub fn for_model(
        model: &OperationModel,
        method: OperationMethod<T>,
        scopes: Arc<dyn InitialiserScopeProvider>,
    ) -> Result<Self, ConfigurationError> {
        check_mode(model, &method)?;
        Ok(Self::new(method, scopes))
    }

    /// Shares a metadata cache with other factories.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ReflectionCache>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn method(&self) -> &OperationMethod<T> {
        &self.method
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ReflectionCache> {
        &self.cache
    }

    /// Builds a delegate from `parameters` and returns an executor for it.
    ///
    /// One resolver is registered per parameter, in name order. The
    /// initialiser scope is held only for the duration of the build and is
    /// completed before the result is inspected.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionError` naming `T` if the method does not support
    /// the model's mode, no initialiser scope is available, or the build
    /// fails. No executor is produced in that case.
    pub fn create_executor(
        &self,
        model: &Arc<OperationModel>,
        parameters: ParameterMap,
    ) -> Result<Executor<T>, ConstructionError> {
        let type_name = type_name::<T>();
        check_mode(model, &self.method).map_err(|e| ConstructionError::new(type_name, e))?;

        let mut entries: Vec<_> = parameters.into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut builder = DefaultObjectBuilder::<T>::new(Arc::clone(&self.cache));
        for (name, value) in entries {
            builder.add_property_resolver(name, resolver_for(value));
        }

        let scope = InitialiserScope::acquire(self.scopes.as_ref())
            .map_err(|e| ConstructionError::new(type_name, e))?;
        let built = builder.build(&ValueResolvingContext::new(scope.event()));
        drop(scope);

        let delegate = built.map_err(|e| {
            warn!(operation = %model.name, type_name, error = %e, "delegate construction failed");
            ConstructionError::new(type_name, e)
        })?;

        debug!(
            operation = %model.name,
            type_name,
            mode = ?model.execution_mode,
            "executor created"
        );

        Ok(match &self.method {
            OperationMethod::Blocking(f) => Executor::Blocking(BlockingExecutor::new(
                Arc::clone(model),
                Arc::clone(f),
                delegate,
            )),
            OperationMethod::NonBlocking(f) => Executor::NonBlocking(NonBlockingExecutor::new(
                Arc::clone(model),
                Arc::clone(f),
                delegate,
            )),
        })
    }
}

impl<T: OperationDelegate> std::fmt::Debug for ReflectiveOperationExecutorFactory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectiveOperationExecutorFactory")
            .field("type_name", &type_name::<T>())
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

fn check_mode<T>(
    model: &OperationModel,
    method: &OperationMethod<T>,
) -> Result<(), ConfigurationError> {
    if model.execution_mode == method.mode() {
        Ok(())
    } else {
        Err(ConfigurationError::ModeMismatch {
            operation: model.name.clone(),
            declared: model.execution_mode,
            actual: method.mode(),
        })
    }
}
