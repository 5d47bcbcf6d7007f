//! Schema DDL.
//!
//! DDL carries no bind markers; the only literals embedded are typed numbers
//! and escaped string literals produced here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use trellis_core::{
    ColumnDefinition, DocumentSchema, QueryError, SchemaError, TrellisResult, VectorSpec,
};

use crate::ident::{quote_ident, string_literal, TableRef};
use crate::statement::Statement;

// ============================================================================
// TABLES
// ============================================================================

fn column_spec(column: &ColumnDefinition) -> String {
    let mut spec = format!("{} {}", quote_ident(&column.name), column.cql_type);
    if column.is_static {
        spec.push_str(" STATIC");
    }
    spec
}

/// `PRIMARY KEY ((p1, p2), c1, c2)`
fn primary_key_clause(schema: &DocumentSchema) -> String {
    let partition: Vec<String> = schema
        .partition_keys()
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect();
    let mut parts = vec![format!("({})", partition.join(", "))];
    parts.extend(schema.clustering_keys().iter().map(|c| quote_ident(&c.name)));
    format!("PRIMARY KEY ({})", parts.join(", "))
}

/// `CLUSTERING ORDER BY (c1 DESC, c2 ASC)`, if the table clusters at all.
fn clustering_order_clause(schema: &DocumentSchema) -> Option<String> {
    let keys = schema.clustering_keys();
    if keys.is_empty() {
        return None;
    }
    let ordering: Vec<String> = keys
        .iter()
        .filter_map(|c| {
            c.clustering
                .map(|(_, order)| format!("{} {}", quote_ident(&c.name), order.keyword()))
        })
        .collect();
    Some(format!("CLUSTERING ORDER BY ({})", ordering.join(", ")))
}

fn push_with(cql: &mut String, options: Vec<String>) {
    if !options.is_empty() {
        cql.push_str(" WITH ");
        cql.push_str(&options.join(" AND "));
    }
}

/// `CREATE TABLE IF NOT EXISTS` for a document schema.
pub fn create_table(schema: &DocumentSchema, table: &TableRef) -> TrellisResult<Statement> {
    if schema.is_view() {
        return Err(SchemaError::InvalidColumn {
            document: schema.type_name.clone(),
            column: String::new(),
            reason: "materialized views are created with create_materialized_view".to_string(),
        }
        .into());
    }

    let mut lines: Vec<String> = schema.columns.iter().map(column_spec).collect();
    lines.push(primary_key_clause(schema));
    let mut cql = format!("CREATE TABLE IF NOT EXISTS {} ({})", table, lines.join(", "));

    let mut options = Vec::new();
    options.extend(clustering_order_clause(schema));
    if let Some(ttl) = schema.table.default_ttl {
        if schema.is_counter_table() {
            return Err(SchemaError::InvalidColumn {
                document: schema.type_name.clone(),
                column: String::new(),
                reason: "counter tables cannot declare a default TTL".to_string(),
            }
            .into());
        }
        options.push(format!("default_time_to_live = {}", ttl));
    }
    push_with(&mut cql, options);

    Ok(Statement::schema(cql))
}

pub fn alter_table_add(table: &TableRef, column: &ColumnDefinition) -> Statement {
    Statement::schema(format!("ALTER TABLE {} ADD {}", table, column_spec(column)))
}

pub fn drop_table(table: &TableRef) -> Statement {
    Statement::schema(format!("DROP TABLE IF EXISTS {}", table))
}

pub fn truncate(table: &TableRef) -> Statement {
    Statement::schema(format!("TRUNCATE {}", table))
}

// ============================================================================
// INDEXES
// ============================================================================

/// Declared index name, or `{table}_{column}_idx`.
pub fn index_name(table: &TableRef, column: &ColumnDefinition) -> String {
    match &column.index {
        Some(Some(name)) => name.clone(),
        _ => format!("{}_{}_idx", table.name, column.name),
    }
}

/// Secondary index, or a storage-attached index for vector columns.
pub fn create_index(table: &TableRef, column: &ColumnDefinition) -> Statement {
    let name = quote_ident(&index_name(table, column));
    match &column.vector {
        Some(spec) => create_vector_index(table, &column.name, &name, spec),
        None => Statement::schema(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            name,
            table,
            quote_ident(&column.name)
        )),
    }
}

fn create_vector_index(table: &TableRef, column: &str, name: &str, spec: &VectorSpec) -> Statement {
    Statement::schema(format!(
        "CREATE CUSTOM INDEX IF NOT EXISTS {} ON {} ({}) USING 'StorageAttachedIndex' \
         WITH OPTIONS = {{'similarity_function': {}}}",
        name,
        table,
        quote_ident(column),
        string_literal(spec.similarity.option_value())
    ))
}

pub fn drop_index(keyspace: &str, name: &str) -> Statement {
    Statement::schema(format!(
        "DROP INDEX IF EXISTS {}.{}",
        quote_ident(keyspace),
        quote_ident(name)
    ))
}

// ============================================================================
// KEYSPACES
// ============================================================================

/// Keyspace replication strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Replication {
    /// One replication factor for the whole cluster.
    Simple { factor: u32 },
    /// Replication factor per data center.
    NetworkTopology(BTreeMap<String, u32>),
}

impl Replication {
    pub fn simple(factor: u32) -> Self {
        Replication::Simple { factor }
    }

    pub fn network_topology<I, S>(factors: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Replication::NetworkTopology(factors.into_iter().map(|(dc, n)| (dc.into(), n)).collect())
    }

    fn render(&self) -> String {
        match self {
            Replication::Simple { factor } => format!(
                "{{'class': 'SimpleStrategy', 'replication_factor': {}}}",
                factor
            ),
            Replication::NetworkTopology(factors) => {
                let mut entries = vec!["'class': 'NetworkTopologyStrategy'".to_string()];
                entries.extend(
                    factors
                        .iter()
                        .map(|(dc, n)| format!("{}: {}", string_literal(dc), n)),
                );
                format!("{{{}}}", entries.join(", "))
            }
        }
    }
}

pub fn create_keyspace(name: &str, replication: &Replication, durable_writes: bool) -> Statement {
    let mut cql = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {}",
        quote_ident(name),
        replication.render()
    );
    if !durable_writes {
        cql.push_str(" AND durable_writes = false");
    }
    Statement::schema(cql)
}

pub fn drop_keyspace(name: &str) -> Statement {
    Statement::schema(format!("DROP KEYSPACE IF EXISTS {}", quote_ident(name)))
}

// ============================================================================
// MATERIALIZED VIEWS
// ============================================================================

/// `CREATE MATERIALIZED VIEW` for a view document.
///
/// Every primary key column of the view needs an explicit `IS NOT NULL`
/// predicate.
pub fn create_materialized_view(schema: &DocumentSchema, view: &TableRef) -> TrellisResult<Statement> {
    let definition = schema
        .table
        .view
        .as_ref()
        .ok_or_else(|| SchemaError::InvalidColumn {
            document: schema.type_name.clone(),
            column: String::new(),
            reason: "document is not a materialized view".to_string(),
        })?;

    for key in schema.primary_key() {
        if !definition.not_null.iter().any(|c| c == &key.name) {
            return Err(QueryError::ViewPredicateMissing {
                view: view.name.clone(),
                column: key.name.clone(),
            }
            .into());
        }
    }

    let columns: Vec<String> = schema.columns.iter().map(|c| quote_ident(&c.name)).collect();
    let not_null: Vec<String> = definition
        .not_null
        .iter()
        .map(|c| format!("{} IS NOT NULL", quote_ident(c)))
        .collect();
    let base = view.sibling(definition.base_table.clone());

    let mut cql = format!(
        "CREATE MATERIALIZED VIEW IF NOT EXISTS {} AS SELECT {} FROM {} WHERE {} {}",
        view,
        columns.join(", "),
        base,
        not_null.join(" AND "),
        primary_key_clause(schema)
    );
    push_with(&mut cql, clustering_order_clause(schema).into_iter().collect());

    Ok(Statement::schema(cql))
}

pub fn drop_materialized_view(view: &TableRef) -> Statement {
    Statement::schema(format!("DROP MATERIALIZED VIEW IF EXISTS {}", view))
}

/// Table (or view) plus every declared index, in execution order.
pub fn create_schema(schema: &DocumentSchema, table: &TableRef) -> TrellisResult<Vec<Statement>> {
    if schema.is_view() {
        return Ok(vec![create_materialized_view(schema, table)?]);
    }
    let mut statements = vec![create_table(schema, table)?];
    statements.extend(
        schema
            .indexed_columns()
            .into_iter()
            .map(|column| create_index(table, column)),
    );
    Ok(statements)
}
