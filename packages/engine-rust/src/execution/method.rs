use std::fmt;
use std::sync::Arc;

use opforge_core::{ExecutionMode, Value};

use super::completion::CompletionCallback;
use super::context::ExecutionContext;

/// Blocking target: runs on the caller's thread and returns the result.
pub type BlockingFn<T> = dyn Fn(&mut T, &ExecutionContext) -> anyhow::Result<Value> + Send + Sync;

/// Non-blocking target: takes ownership of the delegate and must arrange for
/// the callback to be completed, possibly later and on another thread.
pub type NonBlockingFn<T> = dyn Fn(T, ExecutionContext, CompletionCallback) + Send + Sync;

/// Reference to the method implementing an operation, prepared once at
/// configuration load.
pub enum OperationMethod<T> {
    Blocking(Arc<BlockingFn<T>>),
    NonBlocking(Arc<NonBlockingFn<T>>),
}

impl<T> OperationMethod<T> {
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(&mut T, &ExecutionContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(f))
    }

    pub fn non_blocking<F>(f: F) -> Self
    where
        F: Fn(T, ExecutionContext, CompletionCallback) + Send + Sync + 'static,
    {
        Self::NonBlocking(Arc::new(f))
    }

    /// The execution mode this method supports.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        match self {
            Self::Blocking(_) => ExecutionMode::Blocking,
            Self::NonBlocking(_) => ExecutionMode::NonBlocking,
        }
    }
}

impl<T> Clone for OperationMethod<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Blocking(f) => Self::Blocking(Arc::clone(f)),
            Self::NonBlocking(f) => Self::NonBlocking(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for OperationMethod<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OperationMethod").field(&self.mode()).finish()
    }
}
