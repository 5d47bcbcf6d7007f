//! Async execution backend.
//!
//! Same contract as [`Backend`](crate::Backend), but execution suspends at
//! the I/O boundary instead of blocking the calling thread.

use ::async_trait::async_trait;
use std::sync::Arc;

use trellis_core::{Row, TransportError};
use trellis_cql::Statement;

use crate::backend::ExecOptions;

/// Suspending execution backend.
#[async_trait]
pub trait AsyncBackend: Send + Sync {
    /// Execute one statement.
    async fn execute(
        &self,
        statement: &Statement,
        options: &ExecOptions,
    ) -> Result<Vec<Row>, TransportError>;

    /// Keyspace used for documents that do not name one.
    fn default_keyspace(&self) -> Option<&str>;

    /// Release the connection.
    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[async_trait]
impl<B: AsyncBackend + ?Sized> AsyncBackend for Arc<B> {
    async fn execute(
        &self,
        statement: &Statement,
        options: &ExecOptions,
    ) -> Result<Vec<Row>, TransportError> {
        (**self).execute(statement, options).await
    }

    fn default_keyspace(&self) -> Option<&str> {
        (**self).default_keyspace()
    }

    async fn close(&self) -> Result<(), TransportError> {
        (**self).close().await
    }
}
