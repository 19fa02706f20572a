use opforge_core::Value;

use super::{ResolutionError, ValueResolver, ValueResolvingContext};

/// Resolver that always returns the value it was created with.
#[derive(Debug, Clone)]
pub struct StaticValueResolver {
    value: Value,
}

impl StaticValueResolver {
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl ValueResolver for StaticValueResolver {
    fn resolve(&self, _ctx: &ValueResolvingContext<'_>) -> Result<Value, ResolutionError> {
        Ok(self.value.clone())
    }

    fn is_dynamic(&self) -> bool {
        false
    }
}
