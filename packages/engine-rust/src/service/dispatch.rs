//! Dispatch: routes an `OperationRequest` to its registry entry by name.
//!
//! The request's deadline bounds how long the dispatcher waits, and its load
//! shedding permit is handed to the executor so it is held until the
//! operation's work is done.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;

use super::registry::OperationRegistry;
use super::request::{OperationError, OperationRequest, OperationResponse};
use crate::execution::InFlightGuard;

/// Innermost service of the pipeline: builds the executor for each request
/// and runs it to completion.
#[derive(Debug, Clone)]
pub struct OperationDispatcher {
    registry: Arc<OperationRegistry>,
}

impl OperationDispatcher {
    #[must_use]
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }
}

impl Service<OperationRequest> for OperationDispatcher {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: OperationRequest) -> Self::Future {
        let registry = Arc::clone(&self.registry);
        let call_id = request.call_id;
        let deadline = request.deadline;
        let guard = request
            .permit
            .take()
            .map(|permit| Box::new(permit) as InFlightGuard);
        Box::pin(async move {
            let (operation, parameters, ctx) = request.into_parts();
            let value = registry
                .execute_until(&operation, parameters, ctx, deadline, guard)
                .await?;
            Ok(OperationResponse {
                call_id,
                operation,
                value,
            })
        })
    }
}
