//! INSERT, UPDATE and DELETE compilation.
//!
//! Builders validate against the document schema before producing any text:
//! unknown columns, key misuse and counter misuse fail eagerly.

use serde::{Deserialize, Serialize};

use trellis_core::{
    DocumentSchema, Operator, Predicate, QueryError, Row, SchemaError, TrellisResult, Value,
};

use crate::ident::{quote_ident, TableRef};
use crate::select::where_clause;
use crate::statement::{Statement, StatementKind};

// ============================================================================
// OPTIONS
// ============================================================================

/// Options for INSERT.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertOptions {
    /// Conditional write: only insert when the row is absent.
    pub if_not_exists: bool,
    /// Row expiry in seconds.
    pub ttl: Option<u32>,
    /// Explicit write timestamp in microseconds.
    pub timestamp: Option<i64>,
}

impl InsertOptions {
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn with_ttl(mut self, seconds: u32) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn with_timestamp(mut self, micros: i64) -> Self {
        self.timestamp = Some(micros);
        self
    }
}

/// Guard on an UPDATE or DELETE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    IfExists,
    If(Vec<Predicate>),
}

/// Options for UPDATE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateOptions {
    pub ttl: Option<u32>,
    pub timestamp: Option<i64>,
    pub condition: Option<Condition>,
}

impl UpdateOptions {
    pub fn with_ttl(mut self, seconds: u32) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn with_timestamp(mut self, micros: i64) -> Self {
        self.timestamp = Some(micros);
        self
    }

    pub fn if_exists(mut self) -> Self {
        self.condition = Some(Condition::IfExists);
        self
    }

    pub fn only_if(mut self, predicates: Vec<Predicate>) -> Self {
        self.condition = Some(Condition::If(predicates));
        self
    }
}

/// Options for DELETE.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    pub if_exists: bool,
    pub timestamp: Option<i64>,
}

// ============================================================================
// ASSIGNMENTS
// ============================================================================

/// How an UPDATE changes one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignOp {
    /// `c = ?`
    Set,
    /// `c = c + ?` on a counter
    Increment,
    /// `c = c - ?` on a counter
    Decrement,
    /// `c = c + ?` on a list
    Append,
    /// `c = ? + c` on a list
    Prepend,
    /// `c = c + ?` on a set or map
    Add,
    /// `c = c - ?` on a collection
    Remove,
}

impl AssignOp {
    fn is_counter_delta(&self) -> bool {
        matches!(self, AssignOp::Increment | AssignOp::Decrement)
    }

    fn render(&self, column: &str) -> String {
        let c = quote_ident(column);
        match self {
            AssignOp::Set => format!("{c} = ?"),
            AssignOp::Increment | AssignOp::Append | AssignOp::Add => format!("{c} = {c} + ?"),
            AssignOp::Decrement | AssignOp::Remove => format!("{c} = {c} - ?"),
            AssignOp::Prepend => format!("{c} = ? + {c}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub op: AssignOp,
    pub value: Value,
}

impl Assignment {
    pub fn new(column: impl Into<String>, op: AssignOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn set(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, AssignOp::Set, value)
    }

    pub fn increment(column: impl Into<String>, delta: i64) -> Self {
        Self::new(column, AssignOp::Increment, Value::BigInt(delta))
    }

    pub fn decrement(column: impl Into<String>, delta: i64) -> Self {
        Self::new(column, AssignOp::Decrement, Value::BigInt(delta))
    }

    pub fn append(column: impl Into<String>, values: impl Into<Value>) -> Self {
        Self::new(column, AssignOp::Append, values)
    }

    pub fn prepend(column: impl Into<String>, values: impl Into<Value>) -> Self {
        Self::new(column, AssignOp::Prepend, values)
    }

    pub fn add(column: impl Into<String>, values: impl Into<Value>) -> Self {
        Self::new(column, AssignOp::Add, values)
    }

    pub fn remove(column: impl Into<String>, values: impl Into<Value>) -> Self {
        Self::new(column, AssignOp::Remove, values)
    }
}

// ============================================================================
// KEY PREDICATE VALIDATION
// ============================================================================

/// Which rows a key-restricted WHERE may address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyScope {
    /// Every clustering key bound by equality.
    FullRow,
    /// Partition only; used when only static columns change.
    Partition,
    /// Clustering prefix, last bound column may be a range.
    Range,
}

fn validate_key_predicates(
    schema: &DocumentSchema,
    statement: &str,
    predicates: &[Predicate],
    scope: KeyScope,
) -> TrellisResult<()> {
    for predicate in predicates {
        let column = schema.require_column(&predicate.column)?;
        if !column.is_primary_key() {
            return Err(QueryError::NonKeyPredicate {
                statement: statement.to_string(),
                column: predicate.column.clone(),
            }
            .into());
        }
        let allowed = match predicate.operator {
            Operator::Eq | Operator::In => true,
            op if op.is_range() => column.is_clustering_key() && scope == KeyScope::Range,
            _ => false,
        };
        if !allowed {
            return Err(QueryError::OperatorNotAllowed {
                statement: statement.to_string(),
                column: predicate.column.clone(),
                operator: predicate.operator.symbol().to_string(),
            }
            .into());
        }
    }

    let bound = |name: &str| {
        predicates
            .iter()
            .any(|p| p.column == name && matches!(p.operator, Operator::Eq | Operator::In))
    };

    for key in schema.partition_keys() {
        if !bound(&key.name) {
            return Err(QueryError::MissingKeyPredicate {
                statement: statement.to_string(),
                column: key.name.clone(),
            }
            .into());
        }
    }

    if scope == KeyScope::FullRow {
        for key in schema.clustering_keys() {
            if !bound(&key.name) {
                return Err(QueryError::MissingKeyPredicate {
                    statement: statement.to_string(),
                    column: key.name.clone(),
                }
                .into());
            }
        }
    }

    Ok(())
}

/// Equality predicates on every primary key column of `row`.
pub fn key_predicates(schema: &DocumentSchema, row: &Row) -> TrellisResult<Vec<Predicate>> {
    schema
        .primary_key()
        .into_iter()
        .map(|key| match row.get(&key.name) {
            Some(value) if !value.is_null() => Ok(Predicate::eq(key.name.clone(), value.clone())),
            _ => Err(SchemaError::InvalidColumn {
                document: schema.type_name.clone(),
                column: key.name.clone(),
                reason: "primary key column has no value".to_string(),
            }
            .into()),
        })
        .collect()
}

/// Largest TTL the server accepts, in seconds (20 years).
pub const MAX_TTL: u32 = 630_720_000;

fn push_using(
    statement: &str,
    cql: &mut String,
    params: &mut Vec<Value>,
    ttl: Option<u32>,
    timestamp: Option<i64>,
) -> TrellisResult<()> {
    let mut parts = Vec::new();
    if let Some(ttl) = ttl {
        let bound = i32::try_from(ttl)
            .ok()
            .filter(|_| ttl <= MAX_TTL)
            .ok_or_else(|| QueryError::OperatorNotAllowed {
                statement: statement.to_string(),
                column: "TTL".to_string(),
                operator: format!("TTL {ttl} above {MAX_TTL}"),
            })?;
        parts.push("TTL ?");
        params.push(Value::Int(bound));
    }
    if let Some(ts) = timestamp {
        parts.push("TIMESTAMP ?");
        params.push(Value::BigInt(ts));
    }
    if !parts.is_empty() {
        cql.push_str(" USING ");
        cql.push_str(&parts.join(" AND "));
    }
    Ok(())
}

// ============================================================================
// INSERT
// ============================================================================

/// Compile an INSERT of `row`.
///
/// Null cells are omitted; absent columns with a declared default take it.
pub fn build_insert(
    schema: &DocumentSchema,
    table: &TableRef,
    row: &Row,
    options: &InsertOptions,
) -> TrellisResult<Statement> {
    if schema.is_counter_table() {
        return Err(QueryError::OperatorNotAllowed {
            statement: "INSERT".to_string(),
            column: schema.type_name.clone(),
            operator: "INSERT on a counter table".to_string(),
        }
        .into());
    }
    for (name, _) in row.iter() {
        schema.require_column(name)?;
    }
    key_predicates(schema, row)?;

    let mut columns = Vec::new();
    let mut params = Vec::new();
    for column in &schema.columns {
        let value = match row.get(&column.name) {
            Some(value) if !value.is_null() => Some(value.clone()),
            _ => column.default.clone(),
        };
        if let Some(value) = value {
            columns.push(quote_ident(&column.name));
            params.push(value);
        }
    }

    let placeholders = vec!["?"; columns.len()].join(", ");
    let mut cql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    );
    if options.if_not_exists {
        cql.push_str(" IF NOT EXISTS");
    }
    push_using("INSERT", &mut cql, &mut params, options.ttl, options.timestamp)?;

    Ok(Statement::new(cql, params, StatementKind::Insert))
}

// ============================================================================
// UPDATE
// ============================================================================

/// Compile an UPDATE. Parameters bind in text order: USING, SET, WHERE, IF.
pub fn build_update(
    schema: &DocumentSchema,
    table: &TableRef,
    assignments: &[Assignment],
    predicates: &[Predicate],
    options: &UpdateOptions,
) -> TrellisResult<Statement> {
    if assignments.is_empty() {
        return Err(QueryError::EmptyStatement {
            statement: "UPDATE".to_string(),
        }
        .into());
    }

    let mut counter = false;
    let mut only_static = true;
    for assignment in assignments {
        let column = schema.require_column(&assignment.column)?;
        if column.is_primary_key() {
            return Err(QueryError::OperatorNotAllowed {
                statement: "UPDATE".to_string(),
                column: column.name.clone(),
                operator: "assignment to a primary key column".to_string(),
            }
            .into());
        }
        if column.is_counter != assignment.op.is_counter_delta() {
            return Err(QueryError::OperatorNotAllowed {
                statement: "UPDATE".to_string(),
                column: column.name.clone(),
                operator: format!("{:?}", assignment.op),
            }
            .into());
        }
        counter |= column.is_counter;
        only_static &= column.is_static;
    }

    if counter && (options.ttl.is_some() || options.condition.is_some()) {
        return Err(QueryError::OperatorNotAllowed {
            statement: "UPDATE".to_string(),
            column: schema.type_name.clone(),
            operator: "TTL or condition on a counter update".to_string(),
        }
        .into());
    }

    let scope = if only_static {
        KeyScope::Partition
    } else {
        KeyScope::FullRow
    };
    validate_key_predicates(schema, "UPDATE", predicates, scope)?;

    let mut params = Vec::new();
    let mut cql = format!("UPDATE {}", table);
    push_using("UPDATE", &mut cql, &mut params, options.ttl, options.timestamp)?;

    let sets: Vec<String> = assignments
        .iter()
        .map(|a| {
            params.push(a.value.clone());
            a.op.render(&a.column)
        })
        .collect();
    cql.push_str(" SET ");
    cql.push_str(&sets.join(", "));

    cql.push_str(" WHERE ");
    cql.push_str(&where_clause(predicates, &mut params));

    match &options.condition {
        Some(Condition::IfExists) => cql.push_str(" IF EXISTS"),
        Some(Condition::If(guards)) => {
            for guard in guards {
                schema.require_column(&guard.column)?;
            }
            cql.push_str(" IF ");
            cql.push_str(&where_clause(guards, &mut params));
        }
        None => {}
    }

    Ok(Statement::new(cql, params, StatementKind::Update).with_counter(counter))
}

// ============================================================================
// DELETE
// ============================================================================

/// Compile a DELETE over the full partition key and an optional clustering
/// prefix; range operators are allowed on clustering columns.
pub fn build_delete(
    schema: &DocumentSchema,
    table: &TableRef,
    predicates: &[Predicate],
    options: &DeleteOptions,
) -> TrellisResult<Statement> {
    if predicates.is_empty() {
        return Err(QueryError::EmptyStatement {
            statement: "DELETE".to_string(),
        }
        .into());
    }
    validate_key_predicates(schema, "DELETE", predicates, KeyScope::Range)?;

    let mut params = Vec::new();
    let mut cql = format!("DELETE FROM {}", table);
    push_using("DELETE", &mut cql, &mut params, None, options.timestamp)?;
    cql.push_str(" WHERE ");
    cql.push_str(&where_clause(predicates, &mut params));
    if options.if_exists {
        cql.push_str(" IF EXISTS");
    }

    Ok(Statement::new(cql, params, StatementKind::Delete))
}
