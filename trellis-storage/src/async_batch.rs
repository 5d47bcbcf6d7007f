//! Suspending batch accumulator. Accumulation is identical to
//! [`Batch`](crate::Batch); only the flush awaits.

use trellis_core::{Document, TrellisResult};
use trellis_cql::{
    build_batch, Assignment, BatchMode, DeleteOptions, InsertOptions, Statement, UpdateOptions,
};

use crate::async_backend::AsyncBackend;
use crate::async_session::AsyncSession;
use crate::plan;

/// Scoped statement buffer, flushed as one batch.
pub struct AsyncBatch<'s, B: AsyncBackend> {
    session: &'s AsyncSession<B>,
    mode: BatchMode,
    buffer: Vec<Statement>,
}

impl<'s, B: AsyncBackend> AsyncBatch<'s, B> {
    pub(crate) fn new(session: &'s AsyncSession<B>, mode: BatchMode) -> Self {
        Self {
            session,
            mode,
            buffer: Vec::new(),
        }
    }

    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    pub fn add(&mut self, statement: Statement) -> &mut Self {
        self.buffer.push(statement);
        self
    }

    pub fn save<D: Document>(&mut self, document: &D) -> TrellisResult<&mut Self> {
        self.save_with(document, &InsertOptions::default())
    }

    pub fn save_with<D: Document>(
        &mut self,
        document: &D,
        options: &InsertOptions,
    ) -> TrellisResult<&mut Self> {
        let statement = plan::plan_save(document, self.session.default_keyspace(), options)?;
        Ok(self.add(statement))
    }

    pub fn update<D: Document>(
        &mut self,
        document: &D,
        assignments: &[Assignment],
        options: &UpdateOptions,
    ) -> TrellisResult<&mut Self> {
        let statement =
            plan::plan_update(document, self.session.default_keyspace(), assignments, options)?;
        Ok(self.add(statement))
    }

    pub fn delete<D: Document>(&mut self, document: &D) -> TrellisResult<&mut Self> {
        let statement = plan::plan_delete(
            document,
            self.session.default_keyspace(),
            &DeleteOptions::default(),
        )?;
        Ok(self.add(statement))
    }

    pub fn statements(&self) -> &[Statement] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Flush the buffer now as one batch; a no-op when empty.
    pub async fn execute(&mut self) -> TrellisResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let statements = std::mem::take(&mut self.buffer);
        let batch = build_batch(self.mode, &statements)?;
        tracing::debug!(mode = %self.mode, statements = statements.len(), "flushing batch");
        self.session.execute(&batch).await.map(|_| ())
    }

    pub async fn commit(mut self) -> TrellisResult<()> {
        self.execute().await
    }

    pub fn discard(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!(mode = %self.mode, statements = self.buffer.len(), "discarding batch");
            self.buffer.clear();
        }
    }
}

impl<B: AsyncBackend> Drop for AsyncBatch<'_, B> {
    fn drop(&mut self) {
        self.discard();
    }
}
