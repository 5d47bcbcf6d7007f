//! Suspending session. Mirrors [`Session`](crate::Session) operation for
//! operation; terminal calls await the backend instead of blocking.

use futures_util::future::BoxFuture;

use trellis_core::{Document, Row, TrellisResult};
use trellis_cql::{
    create_keyspace, Assignment, BatchMode, DeleteOptions, InsertOptions, Replication, Statement,
    TableRef, UpdateOptions,
};

use crate::async_backend::AsyncBackend;
use crate::async_batch::AsyncBatch;
use crate::async_queryset::AsyncQuerySet;
use crate::backend::ExecOptions;
use crate::plan;
use crate::sync::{columns_query, indexes_query, plan_sync, LiveTable, SyncOptions};

/// Suspending session over an async backend.
#[derive(Debug)]
pub struct AsyncSession<B> {
    backend: B,
    options: ExecOptions,
}

impl<B: AsyncBackend> AsyncSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            options: ExecOptions::default(),
        }
    }

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

    pub async fn execute(&self, statement: &Statement) -> TrellisResult<Vec<Row>> {
        tracing::trace!(cql = %statement.cql, params = statement.params.len(), "execute");
        Ok(self.backend.execute(statement, &self.options).await?)
    }

    pub fn query<D: Document>(&self) -> AsyncQuerySet<'_, D, B> {
        AsyncQuerySet::new(self)
    }

    pub async fn save<D: Document>(&self, document: &D) -> TrellisResult<()> {
        self.save_with(document, &InsertOptions::default()).await
    }

    pub async fn save_with<D: Document>(
        &self,
        document: &D,
        options: &InsertOptions,
    ) -> TrellisResult<()> {
        let statement = plan::plan_save(document, self.default_keyspace(), options)?;
        self.execute(&statement).await.map(|_| ())
    }

    pub async fn update<D: Document>(
        &self,
        document: &D,
        assignments: &[Assignment],
        options: &UpdateOptions,
    ) -> TrellisResult<()> {
        let statement = plan::plan_update(document, self.default_keyspace(), assignments, options)?;
        self.execute(&statement).await.map(|_| ())
    }

    pub async fn delete<D: Document>(&self, document: &D) -> TrellisResult<()> {
        let statement =
            plan::plan_delete(document, self.default_keyspace(), &DeleteOptions::default())?;
        self.execute(&statement).await.map(|_| ())
    }

    pub fn batch(&self, mode: BatchMode) -> AsyncBatch<'_, B> {
        AsyncBatch::new(self, mode)
    }

    /// Run `scope` against a fresh batch. A clean return flushes the buffer
    /// once; an error (or cancellation of the scope) discards it.
    ///
    /// ```ignore
    /// session
    ///     .batch_scope(BatchMode::Logged, |batch| Box::pin(async move {
    ///         batch.save(&review)?;
    ///         Ok(())
    ///     }))
    ///     .await?;
    /// ```
    pub async fn batch_scope<'s, T, F>(&'s self, mode: BatchMode, scope: F) -> TrellisResult<T>
    where
        F: for<'b> FnOnce(&'b mut AsyncBatch<'s, B>) -> BoxFuture<'b, TrellisResult<T>>,
    {
        let mut batch = self.batch(mode);
        match scope(&mut batch).await {
            Ok(value) => {
                batch.execute().await?;
                Ok(value)
            }
            Err(e) => {
                batch.discard();
                Err(e)
            }
        }
    }

    pub async fn create_keyspace(
        &self,
        name: &str,
        replication: &Replication,
        durable_writes: bool,
    ) -> TrellisResult<()> {
        self.execute(&create_keyspace(name, replication, durable_writes))
            .await
            .map(|_| ())
    }

    pub async fn sync_table<D: Document>(
        &self,
        options: SyncOptions,
    ) -> TrellisResult<Vec<Statement>> {
        let schema = D::schema()?;
        let table = self.table_for::<D>()?;
        let columns = self.execute(&columns_query(&table)).await?;
        let indexes = self.execute(&indexes_query(&table)).await?;
        let live = LiveTable::from_rows(&columns, &indexes);

        let statements = plan_sync(&schema, &table, &live, options.strict)?;
        if options.dry_run {
            return Ok(statements);
        }
        for statement in &statements {
            tracing::info!(table = %table, cql = %statement.cql, "schema sync");
            self.execute(statement).await?;
        }
        Ok(statements)
    }

    pub async fn close(&self) -> TrellisResult<()> {
        Ok(self.backend.close().await?)
    }
}
