//! WHERE-clause predicates
//!
//! A [`Predicate`] is one `(column, operator, value)` triple; a query's WHERE
//! clause is the conjunction of its predicates in insertion order.

use serde::{Deserialize, Serialize};

use crate::Value;

/// Filter operator for column comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal to
    Eq,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Member of a list of values
    In,
    /// Collection contains value
    Contains,
    /// Map contains key
    ContainsKey,
}

impl Operator {
    /// CQL spelling of the operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::In => "IN",
            Operator::Contains => "CONTAINS",
            Operator::ContainsKey => "CONTAINS KEY",
        }
    }

    /// Keyword-argument suffix, `None` for plain equality.
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Operator::Eq => None,
            Operator::Gt => Some("gt"),
            Operator::Gte => Some("gte"),
            Operator::Lt => Some("lt"),
            Operator::Lte => Some("lte"),
            Operator::In => Some("in"),
            Operator::Contains => Some("contains"),
            Operator::ContainsKey => Some("contains_key"),
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "eq" => Some(Operator::Eq),
            "gt" => Some(Operator::Gt),
            "gte" => Some(Operator::Gte),
            "lt" => Some(Operator::Lt),
            "lte" => Some(Operator::Lte),
            "in" => Some(Operator::In),
            "contains" => Some(Operator::Contains),
            "contains_key" => Some(Operator::ContainsKey),
            _ => None,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
        )
    }
}

/// One conjunctive WHERE triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

impl Predicate {
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Eq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Gte, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Lte, value)
    }

    /// Membership; `values` is bound as a single list parameter.
    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(
            column,
            Operator::In,
            Value::List(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn contains(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Contains, value)
    }

    pub fn contains_key(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::ContainsKey, value)
    }
}
