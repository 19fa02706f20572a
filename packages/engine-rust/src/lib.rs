//! `Opforge` Engine: builds operation delegates from parameter maps and runs
//! them through blocking or non-blocking executors.

pub mod builder;
pub mod config;
pub mod execution;
pub mod lifecycle;
pub mod resolver;
pub mod service;
pub mod telemetry;

pub use builder::{
    BuildError, DefaultObjectBuilder, OperationDelegate, PropertyDescriptor, PropertyError,
    ReflectionCache,
};
pub use config::{EngineConfig, TelemetryConfig};
pub use execution::{
    BlockingExecutor, BoxedExecutor, CompletionCallback, CompletionHandle, ConfigurationError,
    ConstructionError, ExecutionContext, Executor, InFlightGuard, InvocationError,
    NonBlockingExecutor, OperationMethod, ReflectiveOperationExecutorFactory,
};
pub use lifecycle::{InitialiserScope, InitialiserScopeProvider, ScopeError, ScopeRegistry};
pub use opforge_core::parameters;
pub use resolver::{
    ExpressionValueResolver, ResolutionError, StaticValueResolver, ValueResolver,
    ValueResolvingContext,
};
pub use service::{
    build_operation_pipeline, OperationDispatcher, OperationError, OperationRegistry,
    OperationRequest, OperationResponse,
};

#[doc(hidden)]
pub mod __private {
    pub use opforge_core::{FromValue, Value};
}
