use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::traits::{ExpressionScope, ScopeRoot};
use crate::types::Value;

/// Root identifier for event variables.
pub const VARS_ROOT: &str = "vars";
/// Root identifier for shared configuration properties.
pub const PROPS_ROOT: &str = "props";
/// Root identifier for the event's correlation id.
pub const CORRELATION_ID_ROOT: &str = "correlationId";

/// Ambient data an expression can read while an operation is being set up.
///
/// `properties` are shared across all events created by the same provider;
/// `variables` belong to this event only.
#[derive(Debug, Clone)]
pub struct Event {
    correlation_id: String,
    variables: BTreeMap<String, Value>,
    properties: Arc<BTreeMap<String, Value>>,
}

impl Event {
    #[must_use]
    pub fn new(
        correlation_id: impl Into<String>,
        properties: Arc<BTreeMap<String, Value>>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            variables: BTreeMap::new(),
            properties,
        }
    }

    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Sets a variable, returning the previous value if any.
    pub fn set_variable(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        self.variables.insert(name.into(), value.into())
    }

    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_variable(name, value);
        self
    }

    #[must_use]
    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }
}

impl ExpressionScope for Event {
    fn root(&self, name: &str) -> Option<ScopeRoot<'_>> {
        match name {
            VARS_ROOT => Some(ScopeRoot::Map(&self.variables)),
            PROPS_ROOT => Some(ScopeRoot::Map(&self.properties)),
            CORRELATION_ID_ROOT => Some(ScopeRoot::Value(Cow::Owned(Value::String(
                self.correlation_id.clone(),
            )))),
            _ => None,
        }
    }
}
