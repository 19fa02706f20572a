//! Tower middleware layers for the operation pipeline.
//!
//! - [`timeout`]: stamps request deadlines that the executor enforces
//! - [`metrics`]: per-operation spans, counters and latency, labelled from the registry
//! - [`load_shed`]: caps operations whose work is still running
//! - [`pipeline`]: composes all layers around the dispatcher

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use load_shed::{LoadShedLayer, OperationPermit};
pub use metrics::MetricsLayer;
pub use pipeline::build_operation_pipeline;
pub use timeout::TimeoutLayer;
