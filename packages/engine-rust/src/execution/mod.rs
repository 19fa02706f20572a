//! Executors and the factory that produces them.
//!
//! The [`ReflectiveOperationExecutorFactory`] builds a fresh delegate for
//! every request and pairs it with the operation's target method:
//!
//! - **Blocking** operations return a result. Called directly they run on
//!   the caller's thread; behind the registry they run on tokio's blocking
//!   pool so a request budget can bound them.
//! - **Non-blocking** operations receive a [`CompletionCallback`] and signal
//!   success or failure exactly once, possibly from another thread.
//!
//! Executors are consumed by `execute`, so a delegate is used by at most one
//! invocation.

pub mod completion;
pub mod context;
pub mod error;
pub mod executor;
pub mod factory;
pub mod method;

pub use completion::{CompletionCallback, CompletionHandle};
pub use context::ExecutionContext;
pub use error::{ConfigurationError, ConstructionCause, ConstructionError, InvocationError};
pub use executor::{BlockingExecutor, BoxedExecutor, Executor, InFlightGuard, NonBlockingExecutor};
pub use factory::ReflectiveOperationExecutorFactory;
pub use method::{BlockingFn, NonBlockingFn, OperationMethod};
