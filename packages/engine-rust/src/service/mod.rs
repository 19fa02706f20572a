//! Operation registry and the tower dispatch pipeline.
//!
//! Operations are registered once, by name, with a typed factory. Requests
//! then flow through [`build_operation_pipeline`], which layers load
//! shedding, timeouts and metrics around the [`OperationDispatcher`].

pub mod dispatch;
pub mod middleware;
pub mod registry;
pub mod request;

pub use dispatch::OperationDispatcher;
pub use middleware::build_operation_pipeline;
pub use registry::{ExecutorFactory, ModelBoundFactory, OperationRegistry};
pub use request::{OperationError, OperationRequest, OperationResponse};
