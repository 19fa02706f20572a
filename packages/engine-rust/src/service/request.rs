//! Request and response types for the dispatch pipeline.

use std::collections::BTreeMap;

use opforge_core::{ParameterMap, ParameterValue, Value};
use tokio::time::Instant;

use super::middleware::load_shed::OperationPermit;
use crate::execution::{ConstructionError, ExecutionContext, InvocationError};

/// A request to build and run one operation.
///
/// `parameters` configure the delegate; `arguments` are handed to the target
/// method through its [`ExecutionContext`]. `timeout_ms == 0` asks for the
/// pipeline's default budget.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub call_id: u64,
    pub operation: String,
    pub parameters: ParameterMap,
    pub arguments: BTreeMap<String, Value>,
    pub correlation_id: Option<String>,
    pub timeout_ms: u64,
    /// Set by `TimeoutLayer`; the dispatcher stops waiting at this instant.
    pub(crate) deadline: Option<Instant>,
    /// Set by `LoadShedLayer`; travels with the operation's work.
    pub(crate) permit: Option<OperationPermit>,
}

impl OperationRequest {
    #[must_use]
    pub fn new(call_id: u64, operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            call_id,
            operation: operation.into(),
            parameters: ParameterMap::new(),
            arguments: BTreeMap::new(),
            correlation_id: None,
            timeout_ms,
            deadline: None,
            permit: None,
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: ParameterMap) -> Self {
        self.parameters.extend(parameters);
        self
    }

    #[must_use]
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<ParameterValue>,
    ) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Splits the request into the delegate parameters and the execution
    /// context for the target method.
    #[must_use]
    pub fn into_parts(self) -> (String, ParameterMap, ExecutionContext) {
        let mut ctx = ExecutionContext::new(self.operation.as_str()).with_arguments(self.arguments);
        if let Some(id) = self.correlation_id {
            ctx = ctx.with_correlation_id(id);
        }
        (self.operation, self.parameters, ctx)
    }
}

/// Successful outcome of a dispatched operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResponse {
    pub call_id: u64,
    pub operation: String,
    pub value: Value,
}

/// Errors surfaced by the registry and the dispatch pipeline.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("unknown operation: {name}")]
    UnknownOperation { name: String },
    #[error("invalid parameters for `{operation}`: {}", errors.join("; "))]
    InvalidParameters {
        operation: String,
        errors: Vec<String>,
    },
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("engine overloaded, try again later")]
    Overloaded,
}

impl OperationError {
    /// Short label used for the `outcome` metric and span field.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::UnknownOperation { .. } => "unknown_operation",
            Self::InvalidParameters { .. } => "invalid_parameters",
            Self::Construction(_) => "construction_error",
            Self::Invocation(InvocationError::TimedOut { .. }) | Self::Timeout { .. } => "timeout",
            Self::Invocation(_) => "invocation_error",
            Self::Overloaded => "overloaded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_parts_carries_arguments_and_correlation_id() {
        let request = OperationRequest::new(7, "request", 1000)
            .with_parameter("method", "GET")
            .with_argument("path", "/health")
            .with_correlation_id("corr-1");

        let (operation, parameters, ctx) = request.into_parts();
        assert_eq!(operation, "request");
        assert!(parameters.contains_key("method"));
        assert_eq!(ctx.operation(), "request");
        assert_eq!(ctx.correlation_id(), "corr-1");
        assert_eq!(ctx.raw_argument("path"), Some(&Value::from("/health")));
    }

    #[test]
    fn invalid_parameters_lists_every_error() {
        let err = OperationError::InvalidParameters {
            operation: "request".to_string(),
            errors: vec!["missing `a`".to_string(), "missing `b`".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "invalid parameters for `request`: missing `a`; missing `b`"
        );
        assert_eq!(err.outcome(), "invalid_parameters");
    }

    #[test]
    fn completion_timeout_counts_as_timeout() {
        let err = OperationError::from(InvocationError::TimedOut { timeout_ms: 5 });
        assert_eq!(err.outcome(), "timeout");
        assert_eq!(OperationError::Overloaded.outcome(), "overloaded");
    }
}
