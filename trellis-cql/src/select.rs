//! SELECT and COUNT compilation.

use serde::{Deserialize, Serialize};

use trellis_core::{ClusteringOrder, Operator, Predicate, QueryError, TrellisResult, Value};

use crate::ident::{quote_ident, TableRef};
use crate::statement::{Statement, StatementKind};

// ============================================================================
// QUERY SPEC
// ============================================================================

/// Immutable query description.
///
/// Every chain method takes `&self` and returns a new spec with exactly one
/// field changed; the receiver is never touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    predicates: Vec<Predicate>,
    limit: Option<u32>,
    order_by: Vec<(String, ClusteringOrder)>,
    allow_filtering: bool,
    ann: Option<(String, Vec<f32>)>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one conjunctive predicate.
    pub fn filter(&self, predicate: Predicate) -> Self {
        let mut next = self.clone();
        next.predicates.push(predicate);
        next
    }

    pub fn limit(&self, limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..self.clone()
        }
    }

    /// Order by `field`; a leading `-` sorts descending.
    pub fn order_by(&self, field: &str) -> Self {
        let order = match field.strip_prefix('-') {
            Some(column) => (column.to_string(), ClusteringOrder::Desc),
            None => (field.to_string(), ClusteringOrder::Asc),
        };
        let mut next = self.clone();
        next.order_by.push(order);
        next
    }

    pub fn allow_filtering(&self) -> Self {
        Self {
            allow_filtering: true,
            ..self.clone()
        }
    }

    /// Nearest-neighbour ordering on a vector column.
    pub fn ann_of(&self, column: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            ann: Some((column.into(), vector)),
            ..self.clone()
        }
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    pub fn ordering(&self) -> &[(String, ClusteringOrder)] {
        &self.order_by
    }

    pub fn filtering_allowed(&self) -> bool {
        self.allow_filtering
    }

    pub fn ann(&self) -> Option<(&str, &[f32])> {
        self.ann
            .as_ref()
            .map(|(column, vector)| (column.as_str(), vector.as_slice()))
    }

    /// Every column this query references.
    pub fn referenced_columns(&self) -> impl Iterator<Item = &str> {
        self.predicates
            .iter()
            .map(|p| p.column.as_str())
            .chain(self.order_by.iter().map(|(c, _)| c.as_str()))
            .chain(self.ann.iter().map(|(c, _)| c.as_str()))
    }
}

// ============================================================================
// CLAUSES
// ============================================================================

/// Render `a = ? AND b IN ?`, appending each predicate's value to `params`.
pub(crate) fn where_clause(predicates: &[Predicate], params: &mut Vec<Value>) -> String {
    let mut parts = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        let value = match (&predicate.operator, &predicate.value) {
            (Operator::In, Value::List(_) | Value::Set(_)) => predicate.value.clone(),
            (Operator::In, single) => Value::List(vec![single.clone()]),
            (_, value) => value.clone(),
        };
        params.push(value);
        parts.push(format!(
            "{} {} ?",
            quote_ident(&predicate.column),
            predicate.operator.symbol()
        ));
    }
    parts.join(" AND ")
}

fn push_where(cql: &mut String, predicates: &[Predicate], params: &mut Vec<Value>) {
    if !predicates.is_empty() {
        cql.push_str(" WHERE ");
        cql.push_str(&where_clause(predicates, params));
    }
}

// ============================================================================
// BUILDERS
// ============================================================================

/// Compile a spec into `SELECT * FROM ...`.
pub fn build_select(table: &TableRef, spec: &QuerySpec) -> TrellisResult<Statement> {
    let mut params = Vec::new();
    let mut cql = format!("SELECT * FROM {}", table);
    push_where(&mut cql, &spec.predicates, &mut params);

    match (&spec.ann, spec.order_by.is_empty()) {
        (Some((column, _)), false) => {
            return Err(QueryError::OperatorNotAllowed {
                statement: "SELECT".to_string(),
                column: column.clone(),
                operator: "ANN OF combined with ORDER BY".to_string(),
            }
            .into());
        }
        (Some((column, vector)), true) => {
            cql.push_str(&format!(" ORDER BY {} ANN OF ?", quote_ident(column)));
            params.push(Value::Vector(vector.clone()));
        }
        (None, false) => {
            let ordering: Vec<String> = spec
                .order_by
                .iter()
                .map(|(column, order)| format!("{} {}", quote_ident(column), order.keyword()))
                .collect();
            cql.push_str(" ORDER BY ");
            cql.push_str(&ordering.join(", "));
        }
        (None, true) => {}
    }

    if let Some(limit) = spec.limit {
        cql.push_str(&format!(" LIMIT {}", limit));
    }
    if spec.allow_filtering {
        cql.push_str(" ALLOW FILTERING");
    }

    Ok(Statement::new(cql, params, StatementKind::Select))
}

/// Compile a spec into `SELECT COUNT(*) FROM ...`; ordering and limit are ignored.
pub fn build_count(table: &TableRef, spec: &QuerySpec) -> Statement {
    let mut params = Vec::new();
    let mut cql = format!("SELECT COUNT(*) FROM {}", table);
    push_where(&mut cql, &spec.predicates, &mut params);
    if spec.allow_filtering {
        cql.push_str(" ALLOW FILTERING");
    }
    Statement::new(cql, params, StatementKind::Select)
}
