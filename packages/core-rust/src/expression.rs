//! Expression language for dynamic parameter values.
//!
//! An expression is written `#[ <path> ]` or `#[ <path> ?? <fallback> ]`:
//!
//! - `<path>` starts with a root identifier (for example `vars`, `props`,
//!   `correlationId`) followed by `.name` or `[index]` segments.
//! - `<fallback>` is a JSON scalar (`null`, `true`, `false`, a number, or a
//!   double-quoted string) returned when the path does not resolve.
//!
//! Expressions are parsed once and evaluated many times against an
//! [`ExpressionScope`].

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::trace;

use crate::traits::{ExpressionScope, ScopeRoot};
use crate::types::Value;

static ENVELOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^#\[\s*(.*?)\s*\]$").expect("valid envelope regex"));

static PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*|\[[0-9]+\])*$")
        .expect("valid path regex")
});

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.([A-Za-z_][A-Za-z0-9_]*)|\[([0-9]+)\]").expect("valid segment regex")
});

const ROOT_LEN_LIMIT: usize = 64;

/// Errors from parsing or evaluating an [`Expression`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("malformed expression `{source_text}`: {reason}")]
    Malformed {
        source_text: String,
        reason: &'static str,
    },
    #[error("unknown root `{root}` in expression `{source_text}`")]
    UnknownRoot { source_text: String, root: String },
    #[error("expression `{source_text}` did not resolve: `{path}` is absent")]
    Unresolved { source_text: String, path: String },
}

/// One navigation step after the root identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, ".{k}"),
            Self::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: String,
    segments: Vec<Segment>,
    fallback: Option<Value>,
}

impl Expression {
    /// Returns true if `text` uses the `#[...]` expression envelope.
    #[must_use]
    pub fn is_expression(text: &str) -> bool {
        let trimmed = text.trim();
        trimmed.starts_with("#[") && trimmed.ends_with(']')
    }

    /// Parses an expression.
    ///
    /// # Errors
    ///
    /// Returns `ExpressionError::Malformed` when the text is not a valid
    /// `#[path]` or `#[path ?? literal]` expression.
    pub fn parse(text: &str) -> Result<Self, ExpressionError> {
        let malformed = |reason| ExpressionError::Malformed {
            source_text: text.to_string(),
            reason,
        };

        let body = ENVELOPE
            .captures(text.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| malformed("expected `#[...]`"))?;

        let (path, fallback) = match body.split_once("??") {
            Some((path, literal)) => {
                let fallback = parse_fallback(literal.trim())
                    .ok_or_else(|| malformed("fallback must be a JSON scalar"))?;
                (path.trim(), Some(fallback))
            }
            None => (body, None),
        };

        if path.is_empty() {
            return Err(malformed("empty path"));
        }
        if !PATH.is_match(path) {
            return Err(malformed("invalid path syntax"));
        }

        let root_end = path.find(['.', '[']).unwrap_or(path.len());
        let root = &path[..root_end];
        if root.len() > ROOT_LEN_LIMIT {
            return Err(malformed("root identifier too long"));
        }

        let mut segments = Vec::new();
        for caps in SEGMENT.captures_iter(&path[root_end..]) {
            if let Some(key) = caps.get(1) {
                segments.push(Segment::Key(key.as_str().to_string()));
            } else if let Some(idx) = caps.get(2) {
                let idx = idx
                    .as_str()
                    .parse::<usize>()
                    .map_err(|_| malformed("index out of range"))?;
                segments.push(Segment::Index(idx));
            }
        }

        Ok(Self {
            source: text.trim().to_string(),
            root: root.to_string(),
            segments,
            fallback,
        })
    }

    /// The original expression text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn fallback(&self) -> Option<&Value> {
        self.fallback.as_ref()
    }

    /// Evaluates the expression against `scope`.
    ///
    /// # Errors
    ///
    /// - `ExpressionError::UnknownRoot` if the scope does not expose the root.
    /// - `ExpressionError::Unresolved` if a segment is absent and no fallback
    ///   was given.
    pub fn evaluate(&self, scope: &dyn ExpressionScope) -> Result<Value, ExpressionError> {
        let root = scope
            .root(&self.root)
            .ok_or_else(|| ExpressionError::UnknownRoot {
                source_text: self.source.clone(),
                root: self.root.clone(),
            })?;

        match self.navigate(root) {
            Some(value) => Ok(value.into_owned()),
            None => match &self.fallback {
                Some(fallback) => {
                    trace!(expression = %self.source, "path absent, using fallback");
                    Ok(fallback.clone())
                }
                None => Err(ExpressionError::Unresolved {
                    source_text: self.source.clone(),
                    path: self.path(),
                }),
            },
        }
    }

    fn navigate<'a>(&self, root: ScopeRoot<'a>) -> Option<Cow<'a, Value>> {
        let mut segments = self.segments.iter();

        let mut current = match root {
            ScopeRoot::Map(map) => match segments.next() {
                Some(Segment::Key(key)) => Cow::Borrowed(map.get(key)?),
                Some(Segment::Index(_)) => return None,
                None => Cow::Owned(Value::Map(map.clone())),
            },
            ScopeRoot::Value(value) => value,
        };

        for segment in segments {
            current = match current {
                Cow::Borrowed(value) => Cow::Borrowed(step(value, segment)?),
                Cow::Owned(value) => Cow::Owned(step(&value, segment)?.clone()),
            };
        }

        Some(current)
    }

    /// The path portion rendered without the envelope and fallback.
    #[must_use]
    pub fn path(&self) -> String {
        let mut out = self.root.clone();
        for segment in &self.segments {
            out.push_str(&segment.to_string());
        }
        out
    }
}

fn step<'v>(value: &'v Value, segment: &Segment) -> Option<&'v Value> {
    match segment {
        Segment::Key(key) => value.get(key),
        Segment::Index(idx) => value.index(*idx),
    }
}

fn parse_fallback(literal: &str) -> Option<Value> {
    match serde_json::from_str::<serde_json::Value>(literal).ok()? {
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        scalar => Some(Value::from(scalar)),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
