//! Blocking session: the entry point for queries, persistence, batches and
//! schema sync over a [`Backend`].

use trellis_core::{Document, Row, TrellisResult};
use trellis_cql::{
    create_keyspace, Assignment, BatchMode, DeleteOptions, InsertOptions, Replication, Statement,
    TableRef, UpdateOptions,
};

use crate::backend::{Backend, ExecOptions};
use crate::batch::Batch;
use crate::plan;
use crate::queryset::QuerySet;
use crate::sync::{columns_query, indexes_query, plan_sync, LiveTable, SyncOptions};

/// Blocking session over a backend.
#[derive(Debug)]
pub struct Session<B> {
    backend: B,
    options: ExecOptions,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            options: ExecOptions::default(),
        }
    }

    /// Options passed with every statement this session executes.
    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    pub(crate) fn default_keyspace(&self) -> Option<&str> {
        self.backend.default_keyspace()
    }

    pub fn table_for<D: Document>(&self) -> TrellisResult<TableRef> {
        plan::table_for::<D>(self.default_keyspace())
    }

    /// Execute one compiled statement; transport failures pass through.
    pub fn execute(&self, statement: &Statement) -> TrellisResult<Vec<Row>> {
        tracing::trace!(cql = %statement.cql, params = statement.params.len(), "execute");
        Ok(self.backend.execute(statement, &self.options)?)
    }

    /// Start a query over `D`.
    pub fn query<D: Document>(&self) -> QuerySet<'_, D, B> {
        QuerySet::new(self)
    }

    pub fn save<D: Document>(&self, document: &D) -> TrellisResult<()> {
        self.save_with(document, &InsertOptions::default())
    }

    pub fn save_with<D: Document>(&self, document: &D, options: &InsertOptions) -> TrellisResult<()> {
        let statement = plan::plan_save(document, self.default_keyspace(), options)?;
        self.execute(&statement).map(|_| ())
    }

    pub fn update<D: Document>(
        &self,
        document: &D,
        assignments: &[Assignment],
        options: &UpdateOptions,
    ) -> TrellisResult<()> {
        let statement = plan::plan_update(document, self.default_keyspace(), assignments, options)?;
        self.execute(&statement).map(|_| ())
    }

    pub fn delete<D: Document>(&self, document: &D) -> TrellisResult<()> {
        let statement =
            plan::plan_delete(document, self.default_keyspace(), &DeleteOptions::default())?;
        self.execute(&statement).map(|_| ())
    }

    /// An empty batch guard; dropping it without a flush discards the buffer.
    pub fn batch(&self, mode: BatchMode) -> Batch<'_, B> {
        Batch::new(self, mode)
    }

    /// Run `scope` against a fresh batch. A clean return flushes the buffer
    /// once; an error (or unwinding panic) discards it unexecuted.
    pub fn batch_scope<T, F>(&self, mode: BatchMode, scope: F) -> TrellisResult<T>
    where
        F: FnOnce(&mut Batch<'_, B>) -> TrellisResult<T>,
    {
        let mut batch = self.batch(mode);
        match scope(&mut batch) {
            Ok(value) => {
                batch.execute()?;
                Ok(value)
            }
            Err(e) => {
                batch.discard();
                Err(e)
            }
        }
    }

    pub fn create_keyspace(
        &self,
        name: &str,
        replication: &Replication,
        durable_writes: bool,
    ) -> TrellisResult<()> {
        self.execute(&create_keyspace(name, replication, durable_writes))
            .map(|_| ())
    }

    /// Reconcile `D`'s table with the live schema, returning the DDL issued
    /// (or, with `dry_run`, the DDL that would be issued).
    pub fn sync_table<D: Document>(&self, options: SyncOptions) -> TrellisResult<Vec<Statement>> {
        let schema = D::schema()?;
        let table = self.table_for::<D>()?;
        let live = LiveTable::from_rows(
            &self.execute(&columns_query(&table))?,
            &self.execute(&indexes_query(&table))?,
        );

        let statements = plan_sync(&schema, &table, &live, options.strict)?;
        if options.dry_run {
            return Ok(statements);
        }
        for statement in &statements {
            tracing::info!(table = %table, cql = %statement.cql, "schema sync");
            self.execute(statement)?;
        }
        Ok(statements)
    }

    pub fn close(&self) -> TrellisResult<()> {
        Ok(self.backend.close()?)
    }
}
