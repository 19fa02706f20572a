use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::types::Value;

/// Entry point an [`ExpressionScope`] exposes for a root identifier.
#[derive(Debug)]
pub enum ScopeRoot<'a> {
    /// A keyed collection, navigated without cloning the whole map.
    Map(&'a BTreeMap<String, Value>),
    /// A single value (borrowed, or computed on demand).
    Value(Cow<'a, Value>),
}

/// Ambient data that expressions are evaluated against.
///
/// Implementations decide which root identifiers exist (`vars`, `props`, ...).
/// Returning `None` means the root is unknown to this scope, which is a
/// different failure from a known root with a missing key.
pub trait ExpressionScope {
    /// Resolves a root identifier.
    fn root(&self, name: &str) -> Option<ScopeRoot<'_>>;
}
