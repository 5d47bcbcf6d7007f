//! BATCH wrapper.

use serde::{Deserialize, Serialize};
use std::fmt;

use trellis_core::{QueryError, TrellisResult};

use crate::statement::{Statement, StatementKind};

/// Batch flavour; the caller chooses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BatchMode {
    /// Atomic across partitions.
    #[default]
    Logged,
    /// No batch log; higher throughput, no atomicity.
    Unlogged,
    /// Counter deltas only.
    Counter,
}

impl BatchMode {
    fn keyword(&self) -> &'static str {
        match self {
            BatchMode::Logged => "BEGIN BATCH",
            BatchMode::Unlogged => "BEGIN UNLOGGED BATCH",
            BatchMode::Counter => "BEGIN COUNTER BATCH",
        }
    }
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchMode::Logged => "logged",
            BatchMode::Unlogged => "unlogged",
            BatchMode::Counter => "counter",
        };
        f.write_str(name)
    }
}

/// Wrap mutations into one batch statement, concatenating their parameters
/// in statement order.
pub fn build_batch(mode: BatchMode, statements: &[Statement]) -> TrellisResult<Statement> {
    if statements.is_empty() {
        return Err(QueryError::EmptyStatement {
            statement: "BATCH".to_string(),
        }
        .into());
    }

    let mut cql = String::from(mode.keyword());
    let mut params = Vec::new();
    for statement in statements {
        if !statement.kind.is_mutation() {
            return Err(QueryError::BatchModeMismatch {
                mode: mode.to_string(),
                reason: format!("{:?} statements", statement.kind),
            }
            .into());
        }
        match (mode, statement.counter) {
            (BatchMode::Counter, false) => {
                return Err(QueryError::BatchModeMismatch {
                    mode: mode.to_string(),
                    reason: "non-counter mutations".to_string(),
                }
                .into());
            }
            (BatchMode::Logged | BatchMode::Unlogged, true) => {
                return Err(QueryError::BatchModeMismatch {
                    mode: mode.to_string(),
                    reason: "counter mutations".to_string(),
                }
                .into());
            }
            _ => {}
        }
        cql.push(' ');
        cql.push_str(&statement.cql);
        cql.push(';');
        params.extend(statement.params.iter().cloned());
    }
    cql.push_str(" APPLY BATCH");

    Ok(Statement::new(cql, params, StatementKind::Batch).with_counter(mode == BatchMode::Counter))
}
