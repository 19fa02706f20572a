//! Declarative operation models and the parameter maps supplied to them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::expression::{Expression, ExpressionError};
use crate::types::{Value, ValueKind};

/// Whether an operation's executor blocks the caller or signals completion
/// later through a callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Blocking,
    NonBlocking,
}

/// Single parameter definition within an operation's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterModel {
    /// Name of the parameter; matches a delegate property.
    pub name: String,
    /// Declared kind of the resolved value.
    pub kind: ValueKind,
    /// Whether the parameter must be present in every request.
    #[serde(default)]
    pub required: bool,
}

impl ParameterModel {
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Declared shape of an operation: name, parameter schema and execution mode.
///
/// Produced by the configuration layer and treated as immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationModel {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterModel>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
}

impl OperationModel {
    /// Creates a blocking operation model with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            execution_mode: ExecutionMode::Blocking,
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, parameter: ParameterModel) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    #[must_use]
    pub fn is_non_blocking(&self) -> bool {
        self.execution_mode == ExecutionMode::NonBlocking
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterModel> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Validates a parameter map against this schema.
    ///
    /// Reports missing required parameters and kind mismatches for values
    /// that are already resolved. Expression-valued parameters are only
    /// checked for presence; their kind is known after resolution.
    #[must_use]
    pub fn validate(&self, parameters: &ParameterMap) -> ValidationResult {
        let mut errors = Vec::new();

        for def in &self.parameters {
            match parameters.get(&def.name) {
                None if def.required => {
                    errors.push(format!("missing required parameter `{}`", def.name));
                }
                Some(ParameterValue::Resolved(Value::Null)) if def.required => {
                    errors.push(format!("required parameter `{}` is null", def.name));
                }
                Some(ParameterValue::Resolved(value))
                    if !value.is_null() && !def.kind.accepts(value.kind()) =>
                {
                    errors.push(format!(
                        "parameter `{}` expects {}, found {}",
                        def.name,
                        def.kind,
                        value.kind()
                    ));
                }
                _ => {}
            }
        }

        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid { errors }
        }
    }
}

/// Result of validating a parameter map against an operation schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The parameters conform to the schema.
    Valid,
    /// The parameters violate one or more schema constraints.
    Invalid {
        /// Human-readable descriptions of each validation failure.
        errors: Vec<String>,
    },
}

impl ValidationResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// A parameter value that is either already resolved or still an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Expression(Expression),
    Resolved(Value),
}

impl ParameterValue {
    /// Interprets configuration text: `#[...]` becomes an expression, anything
    /// else a string literal.
    ///
    /// # Errors
    ///
    /// Returns `ExpressionError::Malformed` when the text uses the expression
    /// envelope but does not parse.
    pub fn from_literal(text: &str) -> Result<Self, ExpressionError> {
        if Expression::is_expression(text) {
            Expression::parse(text).map(Self::Expression)
        } else {
            Ok(Self::Resolved(Value::String(text.to_string())))
        }
    }

    #[must_use]
    pub fn is_expression(&self) -> bool {
        matches!(self, Self::Expression(_))
    }
}

macro_rules! resolved_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ParameterValue {
                fn from(value: $ty) -> Self {
                    Self::Resolved(Value::from(value))
                }
            }
        )*
    };
}

resolved_from!(bool, i64, i32, u32, f64, &str, String, Vec<Value>);

impl From<Value> for ParameterValue {
    fn from(value: Value) -> Self {
        Self::Resolved(value)
    }
}

impl From<Expression> for ParameterValue {
    fn from(expr: Expression) -> Self {
        Self::Expression(expr)
    }
}

/// Parameter name to value. Supplied fresh for every execution request.
pub type ParameterMap = HashMap<String, ParameterValue>;

/// Builds a [`ParameterMap`] from `name => value` pairs.
#[macro_export]
macro_rules! parameters {
    ($($name:expr => $value:expr),* $(,)?) => {{
        let mut map = $crate::model::ParameterMap::new();
        $(
            map.insert(
                ::std::string::String::from($name),
                $crate::model::ParameterValue::from($value),
            );
        )*
        map
    }};
}
