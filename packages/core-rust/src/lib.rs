//! `Opforge` Core: values, operation models, the expression language, and event scope.

pub mod event;
pub mod expression;
pub mod model;
pub mod traits;
pub mod types;

pub use event::Event;
pub use expression::{Expression, ExpressionError, Segment};
pub use model::{
    ExecutionMode, OperationModel, ParameterMap, ParameterModel, ParameterValue, ValidationResult,
};
pub use traits::{ExpressionScope, ScopeRoot};
pub use types::{ConversionError, FromValue, Value, ValueKind};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
