//! Execution backend contract (blocking mode).
//!
//! The wire client lives behind this trait: it accepts a compiled statement
//! with its bound parameters and returns rows or a transport failure.

use std::sync::Arc;
use std::time::Duration;

use trellis_core::{Consistency, Row, TransportError, TrellisConfig};
use trellis_cql::Statement;

/// Per-call execution parameters, passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    pub consistency: Option<Consistency>,
    /// Forwarded to the backend; never enforced locally.
    pub timeout: Option<Duration>,
    pub fetch_size: Option<u32>,
    pub paging_state: Option<Vec<u8>>,
}

impl ExecOptions {
    /// Consistency and timeout defaults from the configuration.
    pub fn from_config(config: &TrellisConfig) -> Self {
        Self {
            consistency: Some(config.consistency),
            timeout: Some(config.request_timeout),
            ..Default::default()
        }
    }

    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }

    pub fn with_paging_state(mut self, paging_state: Vec<u8>) -> Self {
        self.paging_state = Some(paging_state);
        self
    }
}

/// Blocking execution backend.
pub trait Backend: Send + Sync {
    /// Execute one statement on the calling thread.
    fn execute(&self, statement: &Statement, options: &ExecOptions)
        -> Result<Vec<Row>, TransportError>;

    /// Keyspace used for documents that do not name one.
    fn default_keyspace(&self) -> Option<&str>;

    /// Release the connection.
    fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn execute(
        &self,
        statement: &Statement,
        options: &ExecOptions,
    ) -> Result<Vec<Row>, TransportError> {
        (**self).execute(statement, options)
    }

    fn default_keyspace(&self) -> Option<&str> {
        (**self).default_keyspace()
    }

    fn close(&self) -> Result<(), TransportError> {
        (**self).close()
    }
}
