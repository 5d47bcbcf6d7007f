//! Compiled statements.

use serde::{Deserialize, Serialize};
use std::fmt;
use trellis_core::Value;

/// What a statement does; batches only accept mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Batch,
    Schema,
}

impl StatementKind {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }
}

/// Statement text plus its ordered bound parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub cql: String,
    pub params: Vec<Value>,
    pub kind: StatementKind,
    /// Carries counter deltas; only a counter batch may wrap it.
    pub counter: bool,
}

impl Statement {
    pub fn new(cql: impl Into<String>, params: Vec<Value>, kind: StatementKind) -> Self {
        Self {
            cql: cql.into(),
            params,
            kind,
            counter: false,
        }
    }

    /// Parameterless schema statement.
    pub fn schema(cql: impl Into<String>) -> Self {
        Self::new(cql, Vec::new(), StatementKind::Schema)
    }

    /// Raw statement text; classified as schema unless it reads rows.
    pub fn raw(cql: impl Into<String>, params: Vec<Value>) -> Self {
        let cql = cql.into();
        let head = cql
            .split_whitespace()
            .next()
            .map(str::to_ascii_uppercase)
            .unwrap_or_default();
        let kind = match head.as_str() {
            "SELECT" => StatementKind::Select,
            "INSERT" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            "BEGIN" => StatementKind::Batch,
            _ => StatementKind::Schema,
        };
        Self::new(cql, params, kind)
    }

    pub(crate) fn with_counter(mut self, counter: bool) -> Self {
        self.counter = counter;
        self
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cql)
    }
}
