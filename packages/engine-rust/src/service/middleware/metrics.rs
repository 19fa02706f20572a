//! Operation metrics and spans.
//!
//! Labels come from the registry, not the request: a name that is not
//! registered is recorded as `unregistered`, so arbitrary request names
//! cannot grow the label set. Every series also carries the operation's
//! execution mode.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use opforge_core::ExecutionMode;
use tower::{Layer, Service};
use tracing::{debug, info_span, warn, Instrument};

use crate::service::registry::OperationRegistry;
use crate::service::request::{OperationError, OperationRequest, OperationResponse};

pub const OPERATIONS_TOTAL: &str = "opforge_operations_total";
pub const OPERATION_DURATION_SECONDS: &str = "opforge_operation_duration_seconds";
pub const OPERATIONS_IN_FLIGHT: &str = "opforge_operations_in_flight";

const UNREGISTERED: &str = "unregistered";

/// Metric labels for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OperationLabels {
    operation: String,
    mode: &'static str,
}

impl OperationLabels {
    fn resolve(registry: &OperationRegistry, name: &str) -> Self {
        match registry.model(name) {
            Some(model) => Self {
                operation: model.name.clone(),
                mode: match model.execution_mode {
                    ExecutionMode::Blocking => "blocking",
                    ExecutionMode::NonBlocking => "non_blocking",
                },
            },
            None => Self {
                operation: UNREGISTERED.to_string(),
                mode: "none",
            },
        }
    }
}

/// Counts outcomes, records latency and tracks in-flight requests per
/// registered operation.
#[derive(Debug, Clone)]
pub struct MetricsLayer {
    registry: Arc<OperationRegistry>,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            registry: Arc::clone(&self.registry),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    registry: Arc<OperationRegistry>,
}

impl<S> Service<OperationRequest> for MetricsService<S>
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

    fn call(&mut self, request: OperationRequest) -> Self::Future {
        let labels = OperationLabels::resolve(&self.registry, &request.operation);
        let span = info_span!(
            "operation",
            operation = %request.operation,
            mode = labels.mode,
            call_id = request.call_id,
            correlation_id = request.correlation_id.as_deref(),
            outcome = tracing::field::Empty,
        );

        let in_flight = ::metrics::gauge!(
            OPERATIONS_IN_FLIGHT,
            "operation" => labels.operation.clone(),
            "mode" => labels.mode
        );
        in_flight.increment(1.0);
        let started = Instant::now();
        let fut = self.inner.call(request);

        Box::pin(
            async move {
                let result = fut.await;
                in_flight.decrement(1.0);
                let elapsed = started.elapsed();
                let outcome = result.as_ref().map_or_else(OperationError::outcome, |_| "ok");
                tracing::Span::current().record("outcome", outcome);

                ::metrics::counter!(
                    OPERATIONS_TOTAL,
                    "operation" => labels.operation.clone(),
                    "mode" => labels.mode,
                    "outcome" => outcome
                )
                .increment(1);
                ::metrics::histogram!(
                    OPERATION_DURATION_SECONDS,
                    "operation" => labels.operation,
                    "mode" => labels.mode
                )
                .record(elapsed.as_secs_f64());

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                match &result {
                    Ok(_) => debug!(duration_ms, "operation complete"),
                    Err(err) => warn!(duration_ms, error = %err, "operation failed"),
                }
                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use opforge_core::{OperationModel, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::EngineConfig;
    use crate::execution::{CompletionCallback, ExecutionContext, OperationMethod};
    use crate::lifecycle::ScopeRegistry;
    use crate::service::dispatch::OperationDispatcher;

    crate::operation_delegate! {
        #[derive(Debug)]
        struct Pinger {}
    }

    fn registry() -> Arc<OperationRegistry> {
        let registry =
            OperationRegistry::new(EngineConfig::default(), Arc::new(ScopeRegistry::default()));
        registry
            .register(
                OperationModel::new("ping"),
                OperationMethod::blocking(|_: &mut Pinger, _: &ExecutionContext| {
                    Ok(Value::from("pong"))
                }),
            )
            .unwrap();
        registry
            .register(
                OperationModel::new("ping_later").with_execution_mode(ExecutionMode::NonBlocking),
                OperationMethod::non_blocking(
                    |_: Pinger, _: ExecutionContext, done: CompletionCallback| {
                        done.success("pong");
                    },
                ),
            )
            .unwrap();
        Arc::new(registry)
    }

    #[test]
    fn labels_follow_the_registry() {
        let registry = registry();
        assert_eq!(
            OperationLabels::resolve(&registry, "ping"),
            OperationLabels {
                operation: "ping".to_string(),
                mode: "blocking",
            }
        );
        assert_eq!(OperationLabels::resolve(&registry, "ping_later").mode, "non_blocking");

        let unknown = OperationLabels::resolve(&registry, "../../etc/passwd");
        assert_eq!(unknown.operation, UNREGISTERED);
        assert_eq!(unknown.mode, "none");
    }

    #[tokio::test]
    async fn passes_responses_through() {
        let registry = registry();
        let layer = MetricsLayer::new(Arc::clone(&registry));
        let svc = layer.layer(OperationDispatcher::new(registry));
        let resp = svc.oneshot(OperationRequest::new(42, "ping_later", 0)).await.unwrap();
        assert_eq!(resp.call_id, 42);
        assert_eq!(resp.value, Value::from("pong"));
    }

    #[tokio::test]
    async fn passes_errors_through() {
        let registry = registry();
        let layer = MetricsLayer::new(Arc::clone(&registry));
        let svc = layer.layer(OperationDispatcher::new(registry));
        let err = svc.oneshot(OperationRequest::new(1, "nope", 0)).await.unwrap_err();
        assert_eq!(err.outcome(), "unknown_operation");
    }
}
