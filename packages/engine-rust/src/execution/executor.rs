use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use opforge_core::{ExecutionMode, OperationModel, Value};
use tracing::{debug, warn};

use super::completion::{CompletionCallback, CompletionHandle};
use super::context::ExecutionContext;
use super::error::InvocationError;
use super::method::{BlockingFn, NonBlockingFn};

// ---------------------------------------------------------------------------
// BlockingExecutor
// ---------------------------------------------------------------------------

/// Runs the target method on the caller's thread and returns its result.
pub struct BlockingExecutor<T> {
    model: Arc<OperationModel>,
    method: Arc<BlockingFn<T>>,
    delegate: T,
}

impl<T> BlockingExecutor<T> {
    pub(crate) fn new(model: Arc<OperationModel>, method: Arc<BlockingFn<T>>, delegate: T) -> Self {
        Self {
            model,
            method,
            delegate,
        }
    }

    /// Invokes the target method. The executor is consumed.
    ///
    /// # Errors
    ///
    /// Returns `InvocationError::Failed` with the method's own error.
    pub fn execute(mut self, ctx: &ExecutionContext) -> Result<Value, InvocationError> {
        debug!(
            operation = %self.model.name,
            correlation_id = ctx.correlation_id(),
            "executing blocking operation"
        );
        (self.method)(&mut self.delegate, ctx).map_err(InvocationError::Failed)
    }

    #[must_use]
    pub fn model(&self) -> &OperationModel {
        &self.model
    }

    #[must_use]
    pub fn delegate(&self) -> &T {
        &self.delegate
    }

    pub fn delegate_mut(&mut self) -> &mut T {
        &mut self.delegate
    }
}

impl<T: fmt::Debug> fmt::Debug for BlockingExecutor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingExecutor")
            .field("operation", &self.model.name)
            .field("delegate", &self.delegate)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// NonBlockingExecutor
// ---------------------------------------------------------------------------

/// Hands the delegate and a [`CompletionCallback`] to the target method and
/// returns as soon as the method does.
///
/// The method decides where the work runs; completion may arrive later and
/// on any thread.
pub struct NonBlockingExecutor<T> {
    model: Arc<OperationModel>,
    method: Arc<NonBlockingFn<T>>,
    delegate: T,
}

impl<T> NonBlockingExecutor<T> {
    pub(crate) fn new(
        model: Arc<OperationModel>,
        method: Arc<NonBlockingFn<T>>,
        delegate: T,
    ) -> Self {
        Self {
            model,
            method,
            delegate,
        }
    }

    /// Dispatches the operation. Exactly one of `on_success` / `on_error`
    /// runs, possibly before this call returns.
    pub fn execute<S, E>(self, ctx: ExecutionContext, on_success: S, on_error: E)
    where
        S: FnOnce(Value) + Send + 'static,
        E: FnOnce(InvocationError) + Send + 'static,
    {
        let callback =
            CompletionCallback::from_callbacks(self.model.name.as_str(), on_success, on_error);
        self.execute_with(ctx, callback);
    }

    /// Dispatches the operation with a prepared callback.
    ///
    /// A panic in the target method does not reach the caller. The callback
    /// is dropped while unwinding, which already signals `NotCompleted`.
    pub fn execute_with(self, ctx: ExecutionContext, callback: CompletionCallback) {
        let Self {
            model,
            method,
            delegate,
        } = self;
        debug!(
            operation = %model.name,
            correlation_id = ctx.correlation_id(),
            "dispatching non-blocking operation"
        );
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| method(delegate, ctx, callback))) {
            warn!(
                operation = %model.name,
                panic = panic_message(payload.as_ref()),
                "non-blocking operation panicked during dispatch"
            );
        }
    }

    /// Dispatches the operation and returns a handle to await its outcome.
    #[must_use]
    pub fn execute_handle(self, ctx: ExecutionContext) -> CompletionHandle {
        let (callback, handle) = CompletionHandle::channel(self.model.name.as_str());
        self.execute_with(ctx, callback);
        handle
    }

    #[must_use]
    pub fn model(&self) -> &OperationModel {
        &self.model
    }

    #[must_use]
    pub fn delegate(&self) -> &T {
        &self.delegate
    }

    pub fn delegate_mut(&mut self) -> &mut T {
        &mut self.delegate
    }
}

impl<T: fmt::Debug> fmt::Debug for NonBlockingExecutor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonBlockingExecutor")
            .field("operation", &self.model.name)
            .field("delegate", &self.delegate)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// A ready-to-run executor of either protocol.
#[derive(Debug)]
pub enum Executor<T> {
    Blocking(BlockingExecutor<T>),
    NonBlocking(NonBlockingExecutor<T>),
}

impl<T> Executor<T> {
    #[must_use]
    pub fn execution_mode(&self) -> ExecutionMode {
        match self {
            Self::Blocking(_) => ExecutionMode::Blocking,
            Self::NonBlocking(_) => ExecutionMode::NonBlocking,
        }
    }

    #[must_use]
    pub fn is_non_blocking(&self) -> bool {
        matches!(self, Self::NonBlocking(_))
    }

    #[must_use]
    pub fn model(&self) -> &OperationModel {
        match self {
            Self::Blocking(e) => e.model(),
            Self::NonBlocking(e) => e.model(),
        }
    }

    #[must_use]
    pub fn delegate(&self) -> &T {
        match self {
            Self::Blocking(e) => e.delegate(),
            Self::NonBlocking(e) => e.delegate(),
        }
    }

    pub fn delegate_mut(&mut self) -> &mut T {
        match self {
            Self::Blocking(e) => e.delegate_mut(),
            Self::NonBlocking(e) => e.delegate_mut(),
        }
    }

    /// Runs the executor to completion on the current task.
    ///
    /// Blocking executors run inline; non-blocking ones are awaited for at
    /// most `completion_timeout`. Use [`BoxedExecutor::run`] to keep blocking
    /// work off the async runtime.
    ///
    /// # Errors
    ///
    /// Returns the operation's `InvocationError`.
    pub async fn run(
        self,
        ctx: ExecutionContext,
        completion_timeout: Duration,
    ) -> Result<Value, InvocationError> {
        match self {
            Self::Blocking(e) => e.execute(&ctx),
            Self::NonBlocking(e) => e.execute_handle(ctx).wait(completion_timeout).await,
        }
    }
}

impl<T: Send + 'static> Executor<T> {
    /// Erases the delegate type.
    #[must_use]
    pub fn into_boxed(self) -> BoxedExecutor {
        match self {
            Self::Blocking(e) => BoxedExecutor {
                model: Arc::clone(&e.model),
                run: ErasedRun::Blocking(Box::new(move |ctx| e.execute(&ctx))),
            },
            Self::NonBlocking(e) => BoxedExecutor {
                model: Arc::clone(&e.model),
                run: ErasedRun::NonBlocking(Box::new(move |ctx, callback| {
                    e.execute_with(ctx, callback);
                })),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// BoxedExecutor
// ---------------------------------------------------------------------------

type BlockingRun = Box<dyn FnOnce(ExecutionContext) -> Result<Value, InvocationError> + Send>;
type NonBlockingRun = Box<dyn FnOnce(ExecutionContext, CompletionCallback) + Send>;

/// Held for as long as an operation's work is actually running; see
/// [`BoxedExecutor::run_holding`].
pub type InFlightGuard = Box<dyn Any + Send>;

enum ErasedRun {
    Blocking(BlockingRun),
    NonBlocking(NonBlockingRun),
}

/// An [`Executor`] with its delegate type erased, as stored behind the
/// operation registry.
pub struct BoxedExecutor {
    model: Arc<OperationModel>,
    run: ErasedRun,
}

impl BoxedExecutor {
    #[must_use]
    pub fn model(&self) -> &OperationModel {
        &self.model
    }

    #[must_use]
    pub fn execution_mode(&self) -> ExecutionMode {
        match self.run {
            ErasedRun::Blocking(_) => ExecutionMode::Blocking,
            ErasedRun::NonBlocking(_) => ExecutionMode::NonBlocking,
        }
    }

    /// Runs the executor, waiting at most `budget` for its outcome.
    ///
    /// Blocking operations run on tokio's blocking pool so the budget can
    /// race them; non-blocking ones are awaited through a
    /// [`CompletionHandle`].
    ///
    /// # Errors
    ///
    /// - The operation's own `InvocationError`
    /// - `InvocationError::TimedOut` once `budget` has elapsed
    /// - `InvocationError::Failed` if a blocking target panicked
    pub async fn run(
        self,
        ctx: ExecutionContext,
        budget: Duration,
    ) -> Result<Value, InvocationError> {
        self.run_holding(ctx, budget, None).await
    }

    /// Like [`run`](Self::run), but keeps `guard` alive until the target
    /// method has really finished. That can be after `run_holding` returned
    /// `TimedOut`: a blocking call cannot be interrupted, and a non-blocking
    /// one holds its callback until it completes or drops it.
    ///
    /// An exhausted budget returns `TimedOut` without invoking anything.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn run_holding(
        self,
        ctx: ExecutionContext,
        budget: Duration,
        guard: Option<InFlightGuard>,
    ) -> Result<Value, InvocationError> {
        if budget.is_zero() {
            return Err(InvocationError::TimedOut { timeout_ms: 0 });
        }
        let operation = self.model.name.clone();
        match self.run {
            ErasedRun::Blocking(run) => {
                let task = tokio::task::spawn_blocking(move || {
                    let result = run(ctx);
                    drop(guard);
                    result
                });
                match tokio::time::timeout(budget, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join)) => {
                        let reason = match join.try_into_panic() {
                            Ok(payload) => panic_message(payload.as_ref()).to_string(),
                            Err(_) => "cancelled".to_string(),
                        };
                        warn!(
                            operation = %operation,
                            panic = %reason,
                            "blocking operation panicked"
                        );
                        Err(InvocationError::Failed(anyhow::anyhow!(
                            "operation panicked: {reason}"
                        )))
                    }
                    Err(_elapsed) => {
                        let timeout_ms = millis(budget);
                        warn!(
                            operation = %operation,
                            timeout_ms,
                            "blocking operation exceeded its budget, its result will be discarded"
                        );
                        Err(InvocationError::TimedOut { timeout_ms })
                    }
                }
            }
            ErasedRun::NonBlocking(run) => {
                let (callback, handle) = match guard {
                    Some(guard) => CompletionHandle::channel_holding(operation, guard),
                    None => CompletionHandle::channel(operation),
                };
                run(ctx, callback);
                handle.wait(budget).await
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl fmt::Debug for BoxedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedExecutor")
            .field("operation", &self.model.name)
            .field("mode", &self.execution_mode())
            .finish_non_exhaustive()
    }
}
