use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use opforge_core::{OperationModel, ParameterMap, ValidationResult, Value};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::info;

use super::request::OperationError;
use crate::builder::{OperationDelegate, ReflectionCache};
use crate::config::EngineConfig;
use crate::execution::{
    BoxedExecutor, ConfigurationError, ConstructionError, ExecutionContext, Executor,
    InFlightGuard, OperationMethod, ReflectiveOperationExecutorFactory,
};
use crate::lifecycle::InitialiserScopeProvider;

// ---------------------------------------------------------------------------
// ExecutorFactory trait
// ---------------------------------------------------------------------------

/// Type-erased factory bound to one operation model.
pub trait ExecutorFactory: Send + Sync {
    /// The model this factory produces executors for.
    fn model(&self) -> &Arc<OperationModel>;

    /// Builds a fresh executor from `parameters`.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionError` if no delegate could be built.
    fn create(&self, parameters: ParameterMap) -> Result<BoxedExecutor, ConstructionError>;
}

/// A [`ReflectiveOperationExecutorFactory`] paired with its model.
pub struct ModelBoundFactory<T: OperationDelegate> {
    model: Arc<OperationModel>,
    factory: ReflectiveOperationExecutorFactory<T>,
}

impl<T: OperationDelegate> ModelBoundFactory<T> {
    /// # Errors
    ///
    /// Returns `ConfigurationError::ModeMismatch` if `method` does not
    /// support the model's execution mode.
    pub fn new(
        model: OperationModel,
        method: OperationMethod<T>,
        scopes: Arc<dyn InitialiserScopeProvider>,
    ) -> Result<Self, ConfigurationError> {
        let factory = ReflectiveOperationExecutorFactory::for_model(&model, method, scopes)?;
        Ok(Self {
            model: Arc::new(model),
            factory,
        })
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ReflectionCache>) -> Self {
        self.factory = self.factory.with_cache(cache);
        self
    }
}

impl<T: OperationDelegate> ExecutorFactory for ModelBoundFactory<T> {
    fn model(&self) -> &Arc<OperationModel> {
        &self.model
    }

    fn create(&self, parameters: ParameterMap) -> Result<BoxedExecutor, ConstructionError> {
        self.factory
            .create_executor(&self.model, parameters)
            .map(Executor::into_boxed)
    }
}

// ---------------------------------------------------------------------------
// OperationRegistry
// ---------------------------------------------------------------------------

/// Handler table of operations keyed by name.
///
/// Each entry is prepared once when configuration is loaded; every request
/// then builds its own delegate through the entry's factory. Factories
/// registered through [`register`](Self::register) share one
/// [`ReflectionCache`].
pub struct OperationRegistry {
    entries: DashMap<String, Arc<dyn ExecutorFactory>>,
    /// Registration order, for `names()`.
    order: RwLock<Vec<String>>,
    scopes: Arc<dyn InitialiserScopeProvider>,
    cache: Arc<ReflectionCache>,
    config: Arc<EngineConfig>,
}

impl OperationRegistry {
    #[must_use]
    pub fn new(config: EngineConfig, scopes: Arc<dyn InitialiserScopeProvider>) -> Self {
        Self {
            entries: DashMap::new(),
            order: RwLock::new(Vec::new()),
            scopes,
            cache: Arc::new(ReflectionCache::new()),
            config: Arc::new(config),
        }
    }

    /// Registers an operation implemented by delegate type `T`.
    ///
    /// # Errors
    ///
    /// - `ConfigurationError::ModeMismatch` if `method` does not support the
    ///   model's execution mode
    /// - `ConfigurationError::DuplicateOperation` if the name is taken
    pub fn register<T: OperationDelegate>(
        &self,
        model: OperationModel,
        method: OperationMethod<T>,
    ) -> Result<(), ConfigurationError> {
        let factory = ModelBoundFactory::new(model, method, Arc::clone(&self.scopes))?
            .with_cache(Arc::clone(&self.cache));
        self.register_factory(Arc::new(factory))
    }

    /// Registers a prepared factory under its model's name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::DuplicateOperation` if the name is taken.
    pub fn register_factory(
        &self,
        factory: Arc<dyn ExecutorFactory>,
    ) -> Result<(), ConfigurationError> {
        let name = factory.model().name.clone();
        let mode = factory.model().execution_mode;
        match self.entries.entry(name.clone()) {
            Entry::Occupied(_) => return Err(ConfigurationError::DuplicateOperation { name }),
            Entry::Vacant(slot) => {
                slot.insert(factory);
            }
        }
        self.order.write().push(name.clone());
        info!(operation = %name, mode = ?mode, "operation registered");
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn model(&self, name: &str) -> Option<Arc<OperationModel>> {
        self.entries
            .get(name)
            .map(|entry| Arc::clone(entry.value().model()))
    }

    /// Registered operation names, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.order.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ReflectionCache> {
        &self.cache
    }

    /// Validates `parameters` against the operation's schema and builds an
    /// executor for it.
    ///
    /// # Errors
    ///
    /// - `OperationError::UnknownOperation` if `name` is not registered
    /// - `OperationError::InvalidParameters` if the schema rejects the map
    /// - `OperationError::Construction` if the delegate cannot be built
    pub fn create_executor(
        &self,
        name: &str,
        parameters: ParameterMap,
    ) -> Result<BoxedExecutor, OperationError> {
        let factory = self
            .entries
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| OperationError::UnknownOperation {
                name: name.to_string(),
            })?;

        if let ValidationResult::Invalid { errors } = factory.model().validate(&parameters) {
            return Err(OperationError::InvalidParameters {
                operation: name.to_string(),
                errors,
            });
        }

        factory.create(parameters).map_err(OperationError::from)
    }

    /// Builds an executor and runs it to completion, waiting at most the
    /// configured completion timeout.
    ///
    /// # Errors
    ///
    /// Any error from [`create_executor`](Self::create_executor), or
    /// `OperationError::Invocation` if the operation itself fails or times
    /// out.
    pub async fn execute(
        &self,
        name: &str,
        parameters: ParameterMap,
        ctx: ExecutionContext,
    ) -> Result<Value, OperationError> {
        self.execute_until(name, parameters, ctx, None, None).await
    }

    /// Like [`execute`](Self::execute), but stops waiting at `deadline` if
    /// that comes before the completion timeout. Time spent building the
    /// delegate counts against the deadline. `guard` is held until the
    /// operation's work has finished; see [`BoxedExecutor::run_holding`].
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn execute_until(
        &self,
        name: &str,
        parameters: ParameterMap,
        ctx: ExecutionContext,
        deadline: Option<Instant>,
        guard: Option<InFlightGuard>,
    ) -> Result<Value, OperationError> {
        let executor = self.create_executor(name, parameters)?;
        let limit = self.config.completion_timeout();
        let budget = deadline.map_or(limit, |deadline| {
            deadline.saturating_duration_since(Instant::now()).min(limit)
        });
        executor
            .run_holding(ctx, budget, guard)
            .await
            .map_err(OperationError::from)
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.names())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use opforge_core::{ExecutionMode, ParameterModel, ValueKind};

    use super::*;
    use crate::execution::{CompletionCallback, InvocationError};
    use crate::lifecycle::ScopeRegistry;
    use crate::parameters;

    crate::operation_delegate! {
        #[derive(Debug)]
        struct Greeter {
            greeting: String,
            shout: bool,
        }
    }

    fn greet(g: &mut Greeter, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        let name: String = ctx.argument("name")?;
        let text = format!("{}, {name}", g.greeting);
        Ok(Value::from(if g.shout { text.to_uppercase() } else { text }))
    }

    fn greet_model(name: &str) -> OperationModel {
        OperationModel::new(name)
            .with_parameter(ParameterModel::required("greeting", ValueKind::String))
            .with_parameter(ParameterModel::optional("shout", ValueKind::Bool))
    }

    fn registry() -> (OperationRegistry, Arc<ScopeRegistry>) {
        let scopes = Arc::new(ScopeRegistry::default());
        let config = EngineConfig {
            completion_timeout_ms: 500,
            ..EngineConfig::default()
        };
        (OperationRegistry::new(config, scopes.clone()), scopes)
    }

    #[tokio::test]
    async fn executes_blocking_operation() {
        let (registry, scopes) = registry();
        registry
            .register(greet_model("greet"), OperationMethod::blocking(greet))
            .unwrap();

        let value = registry
            .execute(
                "greet",
                parameters! { "greeting" => "hello", "shout" => true },
                ExecutionContext::new("greet").with_argument("name", "ada"),
            )
            .await
            .unwrap();

        assert_eq!(value, Value::from("HELLO, ADA"));
        assert_eq!(scopes.completed_count(), 1);
    }

    #[tokio::test]
    async fn executes_non_blocking_operation() {
        let (registry, _) = registry();
        registry
            .register(
                greet_model("greet_later").with_execution_mode(ExecutionMode::NonBlocking),
                OperationMethod::non_blocking(
                    |mut g: Greeter, ctx: ExecutionContext, done: CompletionCallback| {
                        tokio::spawn(async move { done.complete(greet(&mut g, &ctx)) });
                    },
                ),
            )
            .unwrap();

        let value = registry
            .execute(
                "greet_later",
                parameters! { "greeting" => "hi" },
                ExecutionContext::new("greet_later").with_argument("name", "bo"),
            )
            .await
            .unwrap();
        assert_eq!(value, Value::from("hi, bo"));
    }

    #[tokio::test]
    async fn invocation_failure_is_reported() {
        let (registry, _) = registry();
        registry
            .register(greet_model("greet"), OperationMethod::blocking(greet))
            .unwrap();

        let err = registry
            .execute(
                "greet",
                parameters! { "greeting" => "hello" },
                ExecutionContext::new("greet"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Invocation(InvocationError::Failed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_non_blocking_operation_times_out() {
        let (registry, _) = registry();
        let parked = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&parked);
        registry
            .register(
                greet_model("never").with_execution_mode(ExecutionMode::NonBlocking),
                OperationMethod::non_blocking(
                    move |_: Greeter, _: ExecutionContext, done: CompletionCallback| {
                        sink.lock().push(done);
                    },
                ),
            )
            .unwrap();

        let err = registry
            .execute("never", parameters! { "greeting" => "x" }, ExecutionContext::new("never"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::Invocation(InvocationError::TimedOut { timeout_ms: 500 })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (registry, _) = registry();
        registry
            .register(greet_model("greet"), OperationMethod::blocking(greet))
            .unwrap();
        let err = registry
            .register(greet_model("greet"), OperationMethod::blocking(greet))
            .unwrap_err();
        assert!(
            matches!(err, ConfigurationError::DuplicateOperation { ref name } if name == "greet")
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn mode_mismatch_is_rejected_at_registration() {
        let (registry, _) = registry();
        let err = registry
            .register(
                greet_model("greet").with_execution_mode(ExecutionMode::NonBlocking),
                OperationMethod::blocking(greet),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ModeMismatch { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_operation_and_schema_violations() {
        let (registry, scopes) = registry();
        registry
            .register(greet_model("greet"), OperationMethod::blocking(greet))
            .unwrap();

        assert!(matches!(
            registry.create_executor("missing", ParameterMap::new()),
            Err(OperationError::UnknownOperation { ref name }) if name == "missing"
        ));

        let err = registry
            .create_executor("greet", parameters! { "shout" => "loud" })
            .unwrap_err();
        match err {
            OperationError::InvalidParameters { errors, .. } => assert_eq!(errors.len(), 2),
            other => panic!("expected InvalidParameters, got {other:?}"),
        }
        // Schema violations are caught before any scope is acquired.
        assert_eq!(scopes.acquired_count(), 0);
    }

    #[test]
    fn names_keep_registration_order_and_share_cache() {
        let (registry, _) = registry();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(greet_model(name), OperationMethod::blocking(greet))
                .unwrap();
        }
        assert_eq!(registry.names(), ["zeta", "alpha", "mid"]);
        assert_eq!(
            registry.model("alpha").map(|m| m.name.clone()),
            Some("alpha".to_string())
        );

        for name in ["zeta", "alpha", "mid"] {
            registry
                .create_executor(name, parameters! { "greeting" => "hey" })
                .unwrap();
        }
        assert_eq!(registry.cache().len(), 1);
        assert_eq!(registry.cache().miss_count(), 1);
    }

    #[tokio::test]
    async fn blocking_operation_is_bounded_by_budget() {
        let (registry, scopes) = registry();
        registry
            .register(
                greet_model("stall"),
                OperationMethod::blocking(|_: &mut Greeter, _: &ExecutionContext| {
                    std::thread::sleep(std::time::Duration::from_millis(300));
                    Ok(Value::Null)
                }),
            )
            .unwrap();

        let started = Instant::now();
        let err = registry
            .execute_until(
                "stall",
                parameters! { "greeting" => "x" },
                ExecutionContext::new("stall"),
                Some(started + std::time::Duration::from_millis(40)),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Invocation(InvocationError::TimedOut { .. })));
        assert!(started.elapsed() < std::time::Duration::from_millis(250));
        assert_eq!(scopes.open_scopes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_never_exceeds_completion_timeout() {
        let (registry, _) = registry();
        let parked = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&parked);
        registry
            .register(
                greet_model("never").with_execution_mode(ExecutionMode::NonBlocking),
                OperationMethod::non_blocking(
                    move |_: Greeter, _: ExecutionContext, done: CompletionCallback| {
                        sink.lock().push(done);
                    },
                ),
            )
            .unwrap();

        let err = registry
            .execute_until(
                "never",
                parameters! { "greeting" => "x" },
                ExecutionContext::new("never"),
                Some(Instant::now() + std::time::Duration::from_secs(60)),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::Invocation(InvocationError::TimedOut { timeout_ms: 500 })
        ));
    }
}
