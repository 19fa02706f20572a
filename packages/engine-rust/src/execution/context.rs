use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context as _;
use opforge_core::{FromValue, Value};
use uuid::Uuid;

/// Per-invocation input handed to the target method.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    operation: Arc<str>,
    correlation_id: String,
    arguments: BTreeMap<String, Value>,
}

impl ExecutionContext {
    /// Creates a context with a fresh correlation id and no arguments.
    #[must_use]
    pub fn new(operation: impl Into<Arc<str>>) -> Self {
        Self {
            operation: operation.into(),
            correlation_id: Uuid::new_v4().to_string(),
            arguments: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: BTreeMap<String, Value>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    #[must_use]
    pub fn arguments(&self) -> &BTreeMap<String, Value> {
        &self.arguments
    }

    #[must_use]
    pub fn raw_argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Reads and converts a required argument.
    ///
    /// # Errors
    ///
    /// Fails if the argument is absent or has the wrong kind.
    pub fn argument<T: FromValue>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .arguments
            .get(name)
            .cloned()
            .with_context(|| format!("missing argument `{name}` for `{}`", self.operation))?;
        T::from_value(value).with_context(|| format!("argument `{name}`"))
    }

    /// Reads an optional argument; absent and `Null` both yield `None`.
    ///
    /// # Errors
    ///
    /// Fails if the argument is present with the wrong kind.
    pub fn optional_argument<T: FromValue>(&self, name: &str) -> anyhow::Result<Option<T>> {
        match self.arguments.get(name).cloned() {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(value)
                .map(Some)
                .with_context(|| format!("argument `{name}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_argument_access() {
        let ctx = ExecutionContext::new("request")
            .with_argument("path", "/health")
            .with_argument("limit", 10_i64);
        assert_eq!(ctx.argument::<String>("path").unwrap(), "/health");
        assert_eq!(ctx.argument::<u32>("limit").unwrap(), 10);
        assert_eq!(ctx.optional_argument::<String>("body").unwrap(), None);
    }

    #[test]
    fn missing_argument_names_operation() {
        let ctx = ExecutionContext::new("request");
        let err = ctx.argument::<String>("path").unwrap_err();
        assert_eq!(err.to_string(), "missing argument `path` for `request`");
    }

    #[test]
    fn wrong_kind_is_an_error() {
        let ctx = ExecutionContext::new("request").with_argument("limit", "ten");
        assert!(ctx.argument::<u32>("limit").is_err());
        assert!(ctx.optional_argument::<u32>("limit").is_err());
    }

    #[test]
    fn correlation_ids_are_fresh_unless_set() {
        let a = ExecutionContext::new("x");
        let b = ExecutionContext::new("x");
        assert_ne!(a.correlation_id(), b.correlation_id());
        assert_eq!(a.with_correlation_id("fixed").correlation_id(), "fixed");
    }
}
