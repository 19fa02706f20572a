//! Exactly-once completion for non-blocking operations.
//!
//! [`CompletionCallback`] is consumed by `success`/`error`, so completing
//! twice does not compile. Dropping it without completing delivers
//! [`InvocationError::NotCompleted`]. [`CompletionHandle`] is the receiving
//! end used when the caller wants to await the outcome with a timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use opforge_core::Value;
use tokio::sync::oneshot;
use tracing::warn;

use super::error::InvocationError;

type Completion = Box<dyn FnOnce(Result<Value, InvocationError>) + Send>;

/// Completion signal handed to a non-blocking target method.
pub struct CompletionCallback {
    operation: Arc<str>,
    complete: Option<Completion>,
}

impl CompletionCallback {
    /// Wraps a single completion function.
    pub fn new<F>(operation: impl Into<Arc<str>>, complete: F) -> Self
    where
        F: FnOnce(Result<Value, InvocationError>) + Send + 'static,
    {
        Self {
            operation: operation.into(),
            complete: Some(Box::new(complete)),
        }
    }

    /// Wraps a success/error callback pair; exactly one of them will run.
    pub fn from_callbacks<S, E>(operation: impl Into<Arc<str>>, on_success: S, on_error: E) -> Self
    where
        S: FnOnce(Value) + Send + 'static,
        E: FnOnce(InvocationError) + Send + 'static,
    {
        Self::new(operation, move |result| match result {
            Ok(value) => on_success(value),
            Err(err) => on_error(err),
        })
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Signals successful completion.
    pub fn success(mut self, value: impl Into<Value>) {
        self.finish(Ok(value.into()));
    }

    /// Signals failure.
    pub fn error(mut self, err: impl Into<anyhow::Error>) {
        self.finish(Err(InvocationError::Failed(err.into())));
    }

    /// Signals the outcome of a fallible computation.
    pub fn complete(mut self, result: anyhow::Result<Value>) {
        self.finish(result.map_err(InvocationError::Failed));
    }

    fn finish(&mut self, result: Result<Value, InvocationError>) {
        if let Some(complete) = self.complete.take() {
            complete(result);
        }
    }
}

impl Drop for CompletionCallback {
    fn drop(&mut self) {
        if self.complete.is_some() {
            warn!(
                operation = %self.operation,
                "non-blocking operation dropped its completion callback without completing"
            );
            self.finish(Err(InvocationError::NotCompleted));
        }
    }
}

impl fmt::Debug for CompletionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionCallback")
            .field("operation", &self.operation)
            .field("pending", &self.complete.is_some())
            .finish()
    }
}

/// Receiving end of a [`CompletionCallback`].
#[derive(Debug)]
pub struct CompletionHandle {
    operation: Arc<str>,
    rx: oneshot::Receiver<Result<Value, InvocationError>>,
}

impl CompletionHandle {
    /// Creates a connected callback/handle pair.
    #[must_use]
    pub fn channel(operation: impl Into<Arc<str>>) -> (CompletionCallback, CompletionHandle) {
        let operation = operation.into();
        let (tx, rx) = oneshot::channel();
        let callback = CompletionCallback::new(Arc::clone(&operation), move |result| {
            // The handle may have been dropped; the outcome is then discarded.
            let _ = tx.send(result);
        });
        (callback, CompletionHandle { operation, rx })
    }

    /// Like [`channel`](Self::channel), but `guard` is dropped only once the
    /// callback completes or is dropped, whether or not anyone is still
    /// waiting on the handle.
    #[must_use]
    pub fn channel_holding<G>(
        operation: impl Into<Arc<str>>,
        guard: G,
    ) -> (CompletionCallback, CompletionHandle)
    where
        G: Send + 'static,
    {
        let operation = operation.into();
        let (tx, rx) = oneshot::channel();
        let callback = CompletionCallback::new(Arc::clone(&operation), move |result| {
            let _ = tx.send(result);
            drop(guard);
        });
        (callback, CompletionHandle { operation, rx })
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Returns the outcome if the operation has already completed.
    pub fn try_outcome(&mut self) -> Option<Result<Value, InvocationError>> {
        self.rx.try_recv().ok()
    }

    /// Waits for completion, up to `timeout`.
    ///
    /// # Errors
    ///
    /// - The operation's own `InvocationError`
    /// - `InvocationError::TimedOut` if nothing arrives in time
    pub async fn wait(self, timeout: Duration) -> Result<Value, InvocationError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_closed)) => Err(InvocationError::NotCompleted),
            Err(_elapsed) => {
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = timeout.as_millis() as u64;
                warn!(
                    operation = %self.operation,
                    timeout_ms,
                    "non-blocking operation did not complete in time"
                );
                Err(InvocationError::TimedOut { timeout_ms })
            }
        }
    }
}
