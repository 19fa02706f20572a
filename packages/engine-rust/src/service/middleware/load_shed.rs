//! Load shedding bounded by work actually in flight.
//!
//! A permit is taken when a request arrives and attached to it. The
//! dispatcher hands it to the executor, so it is released when the
//! operation's work ends, not when the caller gets a response. A blocking
//! call that outlived its deadline still occupies a blocking-pool thread. A
//! non-blocking operation still holding its `CompletionCallback` is still
//! running. Both keep their permit.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower::{Layer, Service};
use tracing::warn;

use crate::service::request::{OperationError, OperationRequest, OperationResponse};

/// One unit of in-flight capacity. Clones share the unit.
#[derive(Debug, Clone)]
pub struct OperationPermit(#[allow(dead_code)] Arc<OwnedSemaphorePermit>);

/// Rejects requests with `OperationError::Overloaded` while
/// `max_in_flight` operations are still running.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    permits: Arc<Semaphore>,
}

impl LoadShedLayer {
    #[must_use]
    pub fn new(max_in_flight: u32) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight as usize)),
        }
    }

    /// Capacity not held by any running operation.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            permits: Arc::clone(&self.permits),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    permits: Arc<Semaphore>,
}

impl<S> Service<OperationRequest> for LoadShedService<S>
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
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => {
                request.permit = Some(OperationPermit(Arc::new(permit)));
                Box::pin(self.inner.call(request))
            }
            Err(_) => {
                warn!(
                    operation = %request.operation,
                    call_id = request.call_id,
                    "shedding operation"
                );
                Box::pin(async { Err(OperationError::Overloaded) })
            }
        }
    }
}
