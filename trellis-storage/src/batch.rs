//! Blocking batch accumulator.

use trellis_core::{Document, TrellisResult};
use trellis_cql::{
    build_batch, Assignment, BatchMode, DeleteOptions, InsertOptions, Statement, UpdateOptions,
};

use crate::backend::Backend;
use crate::plan;
use crate::session::Session;

/// Scoped statement buffer, flushed as one batch.
///
/// Nothing executes on drop: a guard dropped with buffered statements
/// discards them.
pub struct Batch<'s, B: Backend> {
    session: &'s Session<B>,
    mode: BatchMode,
    buffer: Vec<Statement>,
}

impl<'s, B: Backend> Batch<'s, B> {
    pub(crate) fn new(session: &'s Session<B>, mode: BatchMode) -> Self {
        Self {
            session,
            mode,
            buffer: Vec::new(),
        }
    }

    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    /// Buffer a statement without executing it.
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
    ///
    /// The buffer is cleared before execution, so a failed flush is not
    /// retried by a later one.
    pub fn execute(&mut self) -> TrellisResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let statements = std::mem::take(&mut self.buffer);
        let batch = build_batch(self.mode, &statements)?;
        tracing::debug!(mode = %self.mode, statements = statements.len(), "flushing batch");
        self.session.execute(&batch).map(|_| ())
    }

    /// Flush and end the scope.
    pub fn commit(mut self) -> TrellisResult<()> {
        self.execute()
    }

    /// Drop everything buffered so far.
    pub fn discard(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!(mode = %self.mode, statements = self.buffer.len(), "discarding batch");
            self.buffer.clear();
        }
    }
}

impl<B: Backend> Drop for Batch<'_, B> {
    fn drop(&mut self) {
        self.discard();
    }
}
