//! Pipeline composition: wraps the dispatcher in every middleware layer.

use std::sync::Arc;

use tower::{Service, ServiceBuilder};

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::config::EngineConfig;
use crate::service::dispatch::OperationDispatcher;
use crate::service::registry::OperationRegistry;
use crate::service::request::{OperationError, OperationRequest, OperationResponse};

/// Builds the operation pipeline around an [`OperationDispatcher`].
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject before any work once `max_concurrent_operations`
///    operations are still running
/// 2. `TimeoutLayer` -- stamp the request's deadline
/// 3. `MetricsLayer` -- record timing and outcome per registered operation
#[must_use]
pub fn build_operation_pipeline(
    registry: Arc<OperationRegistry>,
    config: &EngineConfig,
) -> impl Service<OperationRequest, Response = OperationResponse, Error = OperationError> + Clone {
    ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(TimeoutLayer::new(config.default_operation_timeout_ms))
        .layer(MetricsLayer::new(Arc::clone(&registry)))
        .service(OperationDispatcher::new(registry))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
