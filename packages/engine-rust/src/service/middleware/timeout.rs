//! Request budgets.
//!
//! The layer does not race the inner service against a timer of its own.
//! It stamps the request with a deadline that the dispatcher hands to the
//! executor: blocking work is raced on the blocking pool, and non-blocking
//! work bounds its `CompletionHandle` wait. When the executor gives up
//! because the deadline passed, the layer reports `OperationError::Timeout`
//! with the budget the caller asked for. A completion timeout that fires
//! before the deadline passes through unchanged.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::Instant;
use tower::{Layer, Service};

use crate::execution::InvocationError;
use crate::service::request::{OperationError, OperationRequest, OperationResponse};

/// Stamps each request with a deadline; `timeout_ms == 0` takes
/// `default_timeout_ms`.
#[derive(Debug, Clone)]
pub struct TimeoutLayer {
    default_timeout_ms: u64,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(default_timeout_ms: u64) -> Self {
        Self { default_timeout_ms }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            default_timeout_ms: self.default_timeout_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    default_timeout_ms: u64,
}

impl<S> TimeoutService<S> {
    fn budget_ms(&self, request: &OperationRequest) -> u64 {
        match request.timeout_ms {
            0 => self.default_timeout_ms,
            ms => ms,
        }
    }
}

impl<S> Service<OperationRequest> for TimeoutService<S>
where
    S: Service<OperationRequest, Response = OperationResponse, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: OperationRequest) -> Self::Future {
        let timeout_ms = self.budget_ms(&request);
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        request.deadline = Some(deadline);

        let fut = self.inner.call(request);
        Box::pin(async move {
            match fut.await {
                Err(OperationError::Invocation(InvocationError::TimedOut { .. }))
                    if Instant::now() >= deadline =>
                {
                    Err(OperationError::Timeout { timeout_ms })
                }
                other => other,
            }
        })
    }
}
