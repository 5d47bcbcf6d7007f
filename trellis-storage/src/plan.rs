//! Statement planning shared by both execution modes.
//!
//! Everything here is pure: a document plus options in, compiled statements
//! (or mapped results) out. Sessions, query sets and batches only add the
//! execution step.

use trellis_core::{
    discriminator_filter, stamp_discriminator, Document, DocumentSchema, LookupError, Predicate,
    QueryError, Row, TrellisError, TrellisResult, Value,
};
use trellis_cql::{
    build_count, build_delete, build_insert, build_select, build_update, key_predicates,
    Assignment, DeleteOptions, InsertOptions, QuerySpec, Statement, TableRef, UpdateOptions,
};

/// Resolve `D`'s table: its own keyspace, else the backend default.
pub fn table_for<D: Document>(default_keyspace: Option<&str>) -> TrellisResult<TableRef> {
    let schema = D::schema()?;
    TableRef::for_schema(&schema, default_keyspace)
}

fn reject_view_write(schema: &DocumentSchema, statement: &str) -> TrellisResult<()> {
    if schema.is_view() {
        return Err(QueryError::OperatorNotAllowed {
            statement: statement.to_string(),
            column: schema.table.name.clone(),
            operator: "write to a materialized view".to_string(),
        }
        .into());
    }
    Ok(())
}

// ============================================================================
// MUTATIONS
// ============================================================================

/// INSERT for a regular table; counter documents save as UPDATE deltas.
///
/// Saving through a polymorphic variant always writes its discriminator.
pub fn plan_save<D: Document>(
    document: &D,
    default_keyspace: Option<&str>,
    options: &InsertOptions,
) -> TrellisResult<Statement> {
    let schema = D::schema()?;
    reject_view_write(&schema, "INSERT")?;
    let table = TableRef::for_schema(&schema, default_keyspace)?;

    let mut row = document.to_row();
    stamp_discriminator(&schema, &mut row);

    if schema.is_counter_table() {
        if options.if_not_exists || options.ttl.is_some() {
            return Err(QueryError::OperatorNotAllowed {
                statement: "UPDATE".to_string(),
                column: schema.type_name.clone(),
                operator: "IF NOT EXISTS or TTL on a counter table".to_string(),
            }
            .into());
        }
        return plan_counter_save(&schema, &table, &row, options.timestamp);
    }

    build_insert(&schema, &table, &row, options)
}

fn plan_counter_save(
    schema: &DocumentSchema,
    table: &TableRef,
    row: &Row,
    timestamp: Option<i64>,
) -> TrellisResult<Statement> {
    let mut assignments = Vec::new();
    for column in schema.columns.iter().filter(|c| c.is_counter) {
        let delta = match row.get(&column.name) {
            Some(Value::Counter(n)) | Some(Value::BigInt(n)) => *n,
            Some(Value::Int(n)) => i64::from(*n),
            Some(Value::Null) | None => continue,
            Some(other) => {
                return Err(TrellisError::ValueConversion {
                    column: column.name.clone(),
                    expected: "counter".to_string(),
                    found: other.kind().to_string(),
                })
            }
        };
        assignments.push(Assignment::increment(column.name.clone(), delta));
    }

    let predicates = key_predicates(schema, row)?;
    let options = UpdateOptions {
        timestamp,
        ..Default::default()
    };
    build_update(schema, table, &assignments, &predicates, &options)
}

/// UPDATE addressed by the document's primary key.
pub fn plan_update<D: Document>(
    document: &D,
    default_keyspace: Option<&str>,
    assignments: &[Assignment],
    options: &UpdateOptions,
) -> TrellisResult<Statement> {
    let schema = D::schema()?;
    reject_view_write(&schema, "UPDATE")?;
    let table = TableRef::for_schema(&schema, default_keyspace)?;
    let predicates = key_predicates(&schema, &document.to_row())?;
    build_update(&schema, &table, assignments, &predicates, options)
}

/// DELETE addressed by the document's primary key.
pub fn plan_delete<D: Document>(
    document: &D,
    default_keyspace: Option<&str>,
    options: &DeleteOptions,
) -> TrellisResult<Statement> {
    let schema = D::schema()?;
    reject_view_write(&schema, "DELETE")?;
    let table = TableRef::for_schema(&schema, default_keyspace)?;
    let predicates = key_predicates(&schema, &document.to_row())?;
    build_delete(&schema, &table, &predicates, options)
}

// ============================================================================
// QUERIES
// ============================================================================

/// Validate referenced columns and, for a concrete variant, add the
/// discriminator equality. A caller predicate on the discriminator column is
/// only accepted when it is that same equality.
fn scoped_spec(schema: &DocumentSchema, spec: &QuerySpec) -> TrellisResult<QuerySpec> {
    for column in spec.referenced_columns() {
        schema.require_column(column)?;
    }
    let Some((column, value)) = discriminator_filter(schema) else {
        return Ok(spec.clone());
    };

    let own = Predicate::eq(column.as_str(), value.clone());
    let mut constrained = false;
    for predicate in spec.predicates().iter().filter(|p| p.column == column) {
        if *predicate != own {
            return Err(QueryError::OperatorNotAllowed {
                statement: "SELECT".to_string(),
                column: column.clone(),
                operator: predicate.operator.symbol().to_string(),
            }
            .into());
        }
        constrained = true;
    }
    Ok(if constrained {
        spec.clone()
    } else {
        spec.filter(own)
    })
}

pub fn plan_select<D: Document>(
    spec: &QuerySpec,
    default_keyspace: Option<&str>,
) -> TrellisResult<Statement> {
    let schema = D::schema()?;
    let table = TableRef::for_schema(&schema, default_keyspace)?;
    build_select(&table, &scoped_spec(&schema, spec)?)
}

pub fn plan_count<D: Document>(
    spec: &QuerySpec,
    default_keyspace: Option<&str>,
) -> TrellisResult<Statement> {
    let schema = D::schema()?;
    let table = TableRef::for_schema(&schema, default_keyspace)?;
    Ok(build_count(&table, &scoped_spec(&schema, spec)?))
}

/// DELETE from the accumulated filters only; no discriminator is injected
/// since deletes address keys.
pub fn plan_query_delete<D: Document>(
    spec: &QuerySpec,
    default_keyspace: Option<&str>,
) -> TrellisResult<Statement> {
    let schema = D::schema()?;
    reject_view_write(&schema, "DELETE")?;
    let table = TableRef::for_schema(&schema, default_keyspace)?;
    build_delete(&schema, &table, spec.predicates(), &DeleteOptions::default())
}

pub fn map_rows<D: Document>(rows: &[Row]) -> TrellisResult<Vec<D>> {
    rows.iter().map(D::from_row).collect()
}

/// Read the aggregate out of a `COUNT(*)` result.
pub fn count_from_rows(rows: &[Row]) -> TrellisResult<u64> {
    let value = rows
        .first()
        .and_then(|row| row.iter().next().map(|(_, v)| v.clone()))
        .unwrap_or(Value::BigInt(0));
    match value {
        Value::BigInt(n) | Value::Counter(n) => Ok(n.max(0) as u64),
        Value::Int(n) => Ok(n.max(0) as u64),
        other => Err(TrellisError::ValueConversion {
            column: "count".to_string(),
            expected: "bigint".to_string(),
            found: other.kind().to_string(),
        }),
    }
}

/// Exactly one document, or a cardinality error.
pub fn expect_one<D: Document>(mut documents: Vec<D>) -> TrellisResult<D> {
    let document = D::descriptor().type_name;
    match documents.len() {
        0 => Err(LookupError::NotFound { document }.into()),
        1 => Ok(documents.remove(0)),
        count => Err(LookupError::MultipleFound { document, count }.into()),
    }
}
