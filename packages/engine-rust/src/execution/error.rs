use opforge_core::ExecutionMode;

use crate::builder::BuildError;
use crate::lifecycle::ScopeError;

/// Why a delegate could not be constructed.
#[derive(Debug, thiserror::Error)]
pub enum ConstructionCause {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// No executor could be produced for an execution request.
#[derive(Debug, thiserror::Error)]
#[error("could not create instance of operation type {type_name}")]
pub struct ConstructionError {
    /// Fully qualified name of the delegate type.
    pub type_name: &'static str,
    #[source]
    pub cause: ConstructionCause,
}

impl ConstructionError {
    #[must_use]
    pub fn new(type_name: &'static str, cause: impl Into<ConstructionCause>) -> Self {
        Self {
            type_name,
            cause: cause.into(),
        }
    }
}

/// The target method failed, or never signalled completion.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("operation failed")]
    Failed(#[source] anyhow::Error),
    #[error("operation released its completion callback without completing")]
    NotCompleted,
    #[error("operation did not complete within {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

/// Operation wiring that is wrong regardless of the request.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("operation `{name}` is already registered")]
    DuplicateOperation { name: String },
    #[error("operation `{operation}` is declared {declared:?} but its method is {actual:?}")]
    ModeMismatch {
        operation: String,
        declared: ExecutionMode,
        actual: ExecutionMode,
    },
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn failed_reports_cause_once_in_chain() {
        let err = InvocationError::Failed(anyhow::anyhow!("connection refused"));
        assert_eq!(err.to_string(), "operation failed");
        let cause = err.source().map(ToString::to_string);
        assert_eq!(cause.as_deref(), Some("connection refused"));
    }
}
