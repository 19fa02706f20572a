//! Value resolution: turning a parameter into a concrete [`Value`].
//!
//! - [`StaticValueResolver`]: wraps an already-resolved literal; never fails
//! - [`ExpressionValueResolver`]: evaluates an expression against the
//!   [`ValueResolvingContext`]; fails when the referenced data is absent
//!
//! Resolvers have no side effects beyond reading the context.

pub mod context;
pub mod expression;
pub mod static_value;

use std::fmt;

use opforge_core::{ExpressionError, ParameterValue, Value};

pub use context::ValueResolvingContext;
pub use expression::ExpressionValueResolver;
pub use static_value::StaticValueResolver;

/// A parameter value could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    #[error("resolution failed: {0}")]
    Failed(#[from] anyhow::Error),
}

/// Produces a parameter's runtime value from a resolution context.
///
/// Each delegate property gets exactly one resolver.
pub trait ValueResolver: Send + Sync + fmt::Debug {
    /// Resolves the value.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError` when the value cannot be produced.
    fn resolve(&self, ctx: &ValueResolvingContext<'_>) -> Result<Value, ResolutionError>;

    /// Whether the result depends on the context.
    fn is_dynamic(&self) -> bool;
}

/// Picks the resolver variant for a parameter value.
#[must_use]
pub fn resolver_for(value: ParameterValue) -> Box<dyn ValueResolver> {
    match value {
        ParameterValue::Resolved(value) => Box::new(StaticValueResolver::new(value)),
        ParameterValue::Expression(expr) => Box::new(ExpressionValueResolver::new(expr)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use opforge_core::{Event, Expression};

    use super::*;

    #[test]
    fn resolver_for_picks_variant() {
        let event = Event::new("c", Arc::new(BTreeMap::new())).with_variable("a", 1_i64);
        let ctx = ValueResolvingContext::new(&event);

        let fixed = resolver_for(ParameterValue::from("GET"));
        assert!(!fixed.is_dynamic());
        assert_eq!(fixed.resolve(&ctx).unwrap(), Value::from("GET"));

        let dynamic = resolver_for(ParameterValue::from(Expression::parse("#[vars.a]").unwrap()));
        assert!(dynamic.is_dynamic());
        assert_eq!(dynamic.resolve(&ctx).unwrap(), Value::Int(1));
    }
}
