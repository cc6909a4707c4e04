//! Message patterns.
//!
//! A [`Pattern`] is an ordered list of conjunct predicates over the
//! structure of a message; the pattern matches a message iff every conjunct
//! matches. Conjuncts are slash-separated paths into the message content,
//! optionally constrained to a value:
//!
//! - `/order/id` — the message carries a node at that path;
//! - `/order/side=buy` — the node exists and its scalar value is `buy`.
//!
//! Arrays are traversed element-wise: a segment applied to an array matches
//! if it matches any element.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised when building patterns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// A pattern must carry at least one conjunct.
    #[error("pattern conjuncts cannot be empty")]
    EmptyConjuncts,

    /// A conjunct path expression could not be parsed.
    #[error("malformed conjunct {0:?}")]
    MalformedConjunct(String),
}

/// One structural predicate within a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conjunct {
    /// Path segments from the content root.
    segments: Vec<String>,
    /// Expected scalar value at the addressed node, if constrained.
    expected: Option<String>,
}

impl Conjunct {
    /// Parse a conjunct from its path-expression form.
    pub fn parse(expression: &str) -> Result<Self, PatternError> {
        let malformed = || PatternError::MalformedConjunct(expression.to_owned());

        let (path, expected) = match expression.split_once('=') {
            Some((path, value)) => (path, Some(value.to_owned())),
            None => (expression, None),
        };
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            return Err(malformed());
        }
        let segments: Vec<String> = path.split('/').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(malformed());
        }
        Ok(Self { segments, expected })
    }

    /// Test the conjunct against a message structure.
    #[must_use]
    pub fn matches(&self, content: &Value) -> bool {
        Self::matches_from(content, &self.segments, self.expected.as_deref())
    }

    fn matches_from(value: &Value, segments: &[String], expected: Option<&str>) -> bool {
        match segments.split_first() {
            None => match expected {
                None => true,
                Some(want) => scalar_eq(value, want),
            },
            Some((head, rest)) => match value {
                Value::Object(map) => map
                    .get(head)
                    .is_some_and(|child| Self::matches_from(child, rest, expected)),
                // Element-wise traversal: any element satisfying the
                // remaining path satisfies the conjunct.
                Value::Array(items) => items
                    .iter()
                    .any(|item| Self::matches_from(item, segments, expected)),
                _ => false,
            },
        }
    }
}

/// Compare the addressed node against the expected scalar.
///
/// Strings compare directly; numbers and booleans compare through their
/// canonical text form, so `/qty=3` matches both `"qty": 3` and `"qty": "3"`.
fn scalar_eq(value: &Value, want: &str) -> bool {
    match value {
        Value::String(s) => s == want,
        Value::Number(n) => n.to_string() == want,
        Value::Bool(b) => b.to_string() == want,
        _ => false,
    }
}

impl fmt::Display for Conjunct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))?;
        if let Some(expected) = &self.expected {
            write!(f, "={expected}")?;
        }
        Ok(())
    }
}

/// A matching rule advertised by a processing unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    /// Ordered conjuncts; all must match.
    conjuncts: Vec<Conjunct>,
    /// Secondary patterns observe matching messages without ever being
    /// selected as the primary receiver.
    secondary: bool,
}

impl Pattern {
    /// Build a primary pattern from path expressions.
    pub fn new<S: AsRef<str>>(conjuncts: &[S]) -> Result<Self, PatternError> {
        Self::with_secondary(conjuncts, false)
    }

    /// Build a secondary pattern from path expressions.
    pub fn secondary<S: AsRef<str>>(conjuncts: &[S]) -> Result<Self, PatternError> {
        Self::with_secondary(conjuncts, true)
    }

    fn with_secondary<S: AsRef<str>>(
        conjuncts: &[S],
        secondary: bool,
    ) -> Result<Self, PatternError> {
        if conjuncts.is_empty() {
            return Err(PatternError::EmptyConjuncts);
        }
        let conjuncts = conjuncts
            .iter()
            .map(|expression| Conjunct::parse(expression.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            conjuncts,
            secondary,
        })
    }

    /// Whether this is a secondary (observe-only) pattern.
    #[must_use]
    pub fn is_secondary(&self) -> bool {
        self.secondary
    }

    /// Number of conjuncts; the matching score of a primary pattern.
    #[must_use]
    pub fn conjunct_count(&self) -> u32 {
        self.conjuncts.len() as u32
    }

    /// Test the pattern against a message structure: all conjuncts must match.
    #[must_use]
    pub fn matches(&self, content: &Value) -> bool {
        self.conjuncts.iter().all(|c| c.matches(content))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conjuncts = self
            .conjuncts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" and ");
        f.write_str(&conjuncts)?;
        if self.secondary {
            f.write_str(" (secondary)")?;
        }
        Ok(())
    }
}
