use opforge_core::{Expression, Value};

use super::{ResolutionError, ValueResolver, ValueResolvingContext};

/// Resolver that evaluates an expression against the context's event.
#[derive(Debug, Clone)]
pub struct ExpressionValueResolver {
    expression: Expression,
}

impl ExpressionValueResolver {
    #[must_use]
    pub fn new(expression: Expression) -> Self {
        Self { expression }
    }

    #[must_use]
    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

impl ValueResolver for ExpressionValueResolver {
    fn resolve(&self, ctx: &ValueResolvingContext<'_>) -> Result<Value, ResolutionError> {
        Ok(self.expression.evaluate(ctx.scope())?)
    }

    fn is_dynamic(&self) -> bool {
        true
    }
}
