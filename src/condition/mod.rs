//! Structured, per-field filter objects.
//!
//! A [`CompareQuery`] is built once with every optional filter spread into it; entries whose value
//! is absent compile to nothing, so callers never branch on which filters are present:
//! ```rust
//! use mysql_wizard::prelude::*;
//!
//! let search: Option<&str> = None;
//! let query = CompareQuery::new()
//!     .eq("status", "active")
//!     .like("name", search, LikePattern::Starts)
//!     .gte("age", 18);
//! # let _ = query;
//! ```

mod compile;
mod operand;

use serde::Serialize;
use serde_json::Value;

use crate::error::DbError;

pub use compile::{CompileScope, Fragment, compile_query, compile_where};
pub use operand::Operand;

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl CompareOperator {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOperator::Eq => "=",
            CompareOperator::Ne => "!=",
            CompareOperator::Gt => ">",
            CompareOperator::Lt => "<",
            CompareOperator::Gte => ">=",
            CompareOperator::Lte => "<=",
        }
    }
}

/// Placement of the `%` wildcard around a LIKE value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LikePattern {
    Starts,
    Ends,
    #[default]
    Contains,
    Exact,
}

impl LikePattern {
    #[must_use]
    pub fn wrap(self, value: &str) -> String {
        match self {
            LikePattern::Starts => format!("{value}%"),
            LikePattern::Ends => format!("%{value}"),
            LikePattern::Contains => format!("%{value}%"),
            LikePattern::Exact => value.to_string(),
        }
    }
}

/// The comparison attached to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum CompareValue {
    /// Equality; an array literal means `IN`, `null` means `IS NULL`.
    Literal(Value),
    Compare {
        operator: CompareOperator,
        value: Option<Value>,
    },
    In(Option<Vec<Value>>),
    /// A string value is wrapped per `pattern`; an object value matches each key as a JSON path.
    Like {
        value: Option<Value>,
        pattern: LikePattern,
    },
    /// JSON-array containment (every element an array) or overlap (flat values).
    InJson(Option<Vec<Value>>),
}

/// Ordered field-to-comparison map. Setting a field twice replaces the earlier entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompareQuery {
    entries: Vec<(String, Option<CompareValue>)>,
}

impl CompareQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal equality entries from a serializable struct or map.
    ///
    /// Fields serialized as `null` become `IS NULL`; fields skipped by serde stay absent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] when the value does not serialize to a JSON object.
    pub fn from_serialize<S: Serialize + ?Sized>(value: &S) -> Result<Self, DbError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(map
                .into_iter()
                .fold(Self::new(), |query, (field, value)| query.literal(field, value))),
            Value::Null => Ok(Self::new()),
            other => Err(DbError::Serialization(serde::ser::Error::custom(format!(
                "condition must serialize to an object, got {other}"
            )))),
        }
    }

    /// Raw entry; `None` records the field as absent.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: Option<CompareValue>) -> Self {
        let field = field.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((field, value)),
        }
        self
    }

    #[must_use]
    pub fn literal(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
        let value = value.into().into_inner().map(CompareValue::Literal);
        self.set(field, value)
    }

    /// Equality; an absent operand leaves the field out.
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.literal(field, value)
    }

    #[must_use]
    pub fn is_null(self, field: impl Into<String>) -> Self {
        self.set(field, Some(CompareValue::Literal(Value::Null)))
    }

    #[must_use]
    pub fn is_not_null(self, field: impl Into<String>) -> Self {
        self.compare(field, CompareOperator::Ne, Operand::null())
    }

    #[must_use]
    pub fn compare(
        self,
        field: impl Into<String>,
        operator: CompareOperator,
        value: impl Into<Operand>,
    ) -> Self {
        let value = value.into().into_inner();
        self.set(field, Some(CompareValue::Compare { operator, value }))
    }

    #[must_use]
    pub fn ne(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.compare(field, CompareOperator::Ne, value)
    }

    #[must_use]
    pub fn gt(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.compare(field, CompareOperator::Gt, value)
    }

    #[must_use]
    pub fn lt(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.compare(field, CompareOperator::Lt, value)
    }

    #[must_use]
    pub fn gte(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.compare(field, CompareOperator::Gte, value)
    }

    #[must_use]
    pub fn lte(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.compare(field, CompareOperator::Lte, value)
    }

    #[must_use]
    pub fn is_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.set(field, Some(CompareValue::In(Some(values))))
    }

    /// `IN` over an optional list; `None` leaves the field out.
    #[must_use]
    pub fn is_in_opt<I, V>(self, field: impl Into<String>, values: Option<I>) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.map(|vals| vals.into_iter().map(Into::into).collect());
        self.set(field, Some(CompareValue::In(values)))
    }

    #[must_use]
    pub fn like(
        self,
        field: impl Into<String>,
        value: impl Into<Operand>,
        pattern: LikePattern,
    ) -> Self {
        let value = value.into().into_inner();
        self.set(field, Some(CompareValue::Like { value, pattern }))
    }

    #[must_use]
    pub fn in_json<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.set(field, Some(CompareValue::InJson(Some(values))))
    }

    #[must_use]
    pub fn entries(&self) -> &[(String, Option<CompareValue>)] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, CompareValue)> for CompareQuery {
    fn from_iter<T: IntoIterator<Item = (K, CompareValue)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::new(), |query, (field, value)| query.set(field, Some(value)))
    }
}
