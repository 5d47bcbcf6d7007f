//! Bookkeeping table of applied migrations.
//!
//! One row per applied unit: `id` (partition key), `description`,
//! `checksum`, `applied_at`. The table name comes from configuration, so its
//! schema is built at runtime rather than through a `Document` impl.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use trellis_core::{
    build_schema, DocumentDescriptor, DocumentSchema, FieldDescriptor, FieldType, Predicate, Row,
    TrellisResult, Value,
};
use trellis_cql::{
    build_delete, build_insert, build_select, create_table, DeleteOptions, InsertOptions,
    QuerySpec, Statement, TableRef,
};

use crate::id::MigrationId;
use crate::migration::Migration;

/// A recorded migration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMigration {
    pub id: MigrationId,
    pub description: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

impl AppliedMigration {
    pub fn from_row(row: &Row) -> TrellisResult<Self> {
        let id: String = row.get_as("id")?;
        Ok(Self {
            id: MigrationId::parse(&id)?,
            description: row.get_as::<Option<String>>("description")?.unwrap_or_default(),
            checksum: row.get_as("checksum")?,
            applied_at: row.get_as("applied_at")?,
        })
    }
}

/// Applied migrations keyed by identifier.
pub type AppliedSet = BTreeMap<MigrationId, AppliedMigration>;

#[derive(Debug, Clone)]
pub struct Ledger {
    table: TableRef,
    schema: DocumentSchema,
}

impl Ledger {
    pub fn new(keyspace: &str, table: &str) -> TrellisResult<Self> {
        let descriptor = DocumentDescriptor::new("AppliedMigration")
            .table(table)
            .keyspace(keyspace)
            .field(FieldDescriptor::new("id", FieldType::Text).partition_key(0))
            .field(FieldDescriptor::new("description", FieldType::Text))
            .field(FieldDescriptor::new("checksum", FieldType::Text))
            .field(FieldDescriptor::new("applied_at", FieldType::Timestamp));
        let schema = build_schema(&descriptor)?;
        Ok(Self {
            table: TableRef::new(keyspace, table),
            schema,
        })
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn create_statement(&self) -> TrellisResult<Statement> {
        create_table(&self.schema, &self.table)
    }

    /// Read-only probe for the table, answered from `system_schema`.
    pub fn exists_query(&self) -> Statement {
        Statement::raw(
            "SELECT table_name FROM system_schema.tables \
             WHERE keyspace_name = ? AND table_name = ?",
            vec![
                Value::from(self.table.keyspace.as_str()),
                Value::from(self.table.name.as_str()),
            ],
        )
    }

    pub fn select_statement(&self) -> TrellisResult<Statement> {
        build_select(&self.table, &QuerySpec::new())
    }

    pub fn record_statement(
        &self,
        unit: &dyn Migration,
        applied_at: DateTime<Utc>,
    ) -> TrellisResult<Statement> {
        let row = Row::new()
            .with("id", unit.id().as_str())
            .with("description", unit.description())
            .with("checksum", unit.checksum())
            .with("applied_at", applied_at);
        build_insert(&self.schema, &self.table, &row, &InsertOptions::default())
    }

    pub fn remove_statement(&self, id: &MigrationId) -> TrellisResult<Statement> {
        build_delete(
            &self.schema,
            &self.table,
            &[Predicate::eq("id", id.as_str())],
            &DeleteOptions::default(),
        )
    }

    pub fn parse_rows(rows: &[Row]) -> TrellisResult<AppliedSet> {
        rows.iter()
            .map(|row| AppliedMigration::from_row(row).map(|m| (m.id.clone(), m)))
            .collect()
    }
}
