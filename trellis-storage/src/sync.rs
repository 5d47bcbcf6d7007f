//! Schema synchronizer.
//!
//! Reconciles a declared document schema with the live table: an absent
//! table is created with its indexes, a present one only ever gains columns.
//! Strict mode additionally adds and drops secondary indexes. Live column
//! types that differ from the declaration are logged, never altered.

use std::collections::{BTreeMap, BTreeSet};

use trellis_core::{DocumentSchema, Row, TrellisResult, Value};
use trellis_cql::{
    alter_table_add, create_index, create_schema, drop_index, index_name, Statement, TableRef,
};

/// How a sync run behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Also reconcile secondary indexes.
    pub strict: bool,
    /// Compute the statements without executing them.
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Live shape of one table, read from the system schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveTable {
    /// Column name -> live type.
    pub columns: BTreeMap<String, String>,
    pub indexes: BTreeSet<String>,
}

impl LiveTable {
    pub fn exists(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Build from `system_schema.columns` and `system_schema.indexes` rows.
    pub fn from_rows(columns: &[Row], indexes: &[Row]) -> Self {
        let text = |row: &Row, column: &str| row.get(column).and_then(Value::as_str).map(str::to_string);
        Self {
            columns: columns
                .iter()
                .filter_map(|row| Some((text(row, "column_name")?, text(row, "type")?)))
                .collect(),
            indexes: indexes
                .iter()
                .filter_map(|row| text(row, "index_name"))
                .collect(),
        }
    }
}

pub fn columns_query(table: &TableRef) -> Statement {
    Statement::raw(
        "SELECT column_name, type, kind FROM system_schema.columns \
         WHERE keyspace_name = ? AND table_name = ?",
        vec![Value::from(table.keyspace.as_str()), Value::from(table.name.as_str())],
    )
}

pub fn indexes_query(table: &TableRef) -> Statement {
    Statement::raw(
        "SELECT index_name FROM system_schema.indexes \
         WHERE keyspace_name = ? AND table_name = ?",
        vec![Value::from(table.keyspace.as_str()), Value::from(table.name.as_str())],
    )
}

fn normalize_type(cql_type: &str) -> String {
    cql_type
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Statements that bring `live` in line with `schema`.
pub fn plan_sync(
    schema: &DocumentSchema,
    table: &TableRef,
    live: &LiveTable,
    strict: bool,
) -> TrellisResult<Vec<Statement>> {
    if !live.exists() {
        return create_schema(schema, table);
    }
    if schema.is_view() {
        // Views cannot be altered column by column.
        return Ok(Vec::new());
    }

    let mut statements = Vec::new();
    for column in &schema.columns {
        match live.columns.get(&column.name) {
            None => statements.push(alter_table_add(table, column)),
            Some(live_type) if normalize_type(live_type) != normalize_type(&column.cql_type) => {
                tracing::warn!(
                    table = %table,
                    column = %column.name,
                    declared = %column.cql_type,
                    live = %live_type,
                    "column type drift"
                );
            }
            Some(_) => {}
        }
    }

    if strict {
        let declared: BTreeSet<String> = schema
            .indexed_columns()
            .into_iter()
            .map(|column| index_name(table, column))
            .collect();
        for column in schema.indexed_columns() {
            if !live.indexes.contains(&index_name(table, column)) {
                statements.push(create_index(table, column));
            }
        }
        for stale in live.indexes.difference(&declared) {
            statements.push(drop_index(&table.keyspace, stale));
        }
    }

    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Review;
    use trellis_core::Document;

    fn table() -> TableRef {
        TableRef::new("shop", "reviews")
    }

    fn live(columns: &[(&str, &str)], indexes: &[&str]) -> LiveTable {
        LiveTable {
            columns: columns
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect(),
            indexes: indexes.iter().map(|i| i.to_string()).collect(),
        }
    }

    #[test]
    fn test_absent_table_is_created_with_indexes() {
        let schema = Review::schema().unwrap();
        let statements = plan_sync(&schema, &table(), &LiveTable::default(), false).unwrap();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].cql.starts_with("CREATE TABLE IF NOT EXISTS shop.reviews"));
        assert!(statements[1].cql.starts_with("CREATE INDEX"));
    }

    #[test]
    fn test_present_table_only_gains_columns() {
        let schema = Review::schema().unwrap();
        let live = live(
            &[
                ("product_id", "text"),
                ("created_at", "timestamp"),
                ("legacy", "text"),
            ],
            &[],
        );
        let cql: Vec<String> = plan_sync(&schema, &table(), &live, false)
            .unwrap()
            .into_iter()
            .map(|s| s.cql)
            .collect();
        assert_eq!(
            cql,
            vec![
                "ALTER TABLE shop.reviews ADD rating int",
                "ALTER TABLE shop.reviews ADD body text",
            ]
        );
    }

    #[test]
    fn test_in_sync_table_is_idempotent() {
        let schema = Review::schema().unwrap();
        let live = live(
            &[
                ("product_id", "text"),
                ("created_at", "timestamp"),
                ("rating", "int"),
                ("body", "text"),
            ],
            &["reviews_rating_idx"],
        );
        assert!(plan_sync(&schema, &table(), &live, true).unwrap().is_empty());
    }

    #[test]
    fn test_type_drift_is_not_altered() {
        let schema = Review::schema().unwrap();
        let live = live(
            &[
                ("product_id", "text"),
                ("created_at", "timestamp"),
                ("rating", "bigint"),
                ("body", "text"),
            ],
            &[],
        );
        assert!(plan_sync(&schema, &table(), &live, false).unwrap().is_empty());
    }

    #[test]
    fn test_strict_reconciles_indexes() {
        let schema = Review::schema().unwrap();
        let live = live(
            &[
                ("product_id", "text"),
                ("created_at", "timestamp"),
                ("rating", "int"),
                ("body", "text"),
            ],
            &["reviews_body_idx"],
        );
        let cql: Vec<String> = plan_sync(&schema, &table(), &live, true)
            .unwrap()
            .into_iter()
            .map(|s| s.cql)
            .collect();
        assert_eq!(
            cql,
            vec![
                "CREATE INDEX IF NOT EXISTS reviews_rating_idx ON shop.reviews (rating)",
                "DROP INDEX IF EXISTS shop.reviews_body_idx",
            ]
        );
    }

    #[test]
    fn test_live_table_from_rows() {
        let columns = vec![Row::new()
            .with("column_name", "rating")
            .with("type", "int")
            .with("kind", "regular")];
        let indexes = vec![Row::new().with("index_name", "reviews_rating_idx")];
        let live = LiveTable::from_rows(&columns, &indexes);
        assert!(live.exists());
        assert_eq!(live.columns.get("rating").map(String::as_str), Some("int"));
        assert!(live.indexes.contains("reviews_rating_idx"));
    }
}
