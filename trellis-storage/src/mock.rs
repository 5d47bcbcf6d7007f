//! In-memory mock backend for testing.
//!
//! Records every statement it executes and answers from scripted responses
//! matched by statement-text substring. Handlers see the statement itself and
//! can keep their own state, which is enough to emulate small tables.

use ::async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, RwLock};

use trellis_core::{Row, TransportError};
use trellis_cql::Statement;

use crate::async_backend::AsyncBackend;
use crate::backend::{Backend, ExecOptions};

type Handler = Arc<dyn Fn(&Statement) -> Result<Vec<Row>, TransportError> + Send + Sync>;

/// Scripted, recording backend usable in both execution modes.
#[derive(Default, Clone)]
pub struct MockBackend {
    default_keyspace: Option<String>,
    executed: Arc<RwLock<Vec<(Statement, ExecOptions)>>>,
    handlers: Arc<RwLock<Vec<(String, Handler)>>>,
}

impl fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBackend")
            .field("default_keyspace", &self.default_keyspace)
            .field("executed", &self.executed_count())
            .finish()
    }
}

fn poisoned() -> TransportError {
    TransportError::new("mock backend lock poisoned")
}

impl MockBackend {
    /// Create a new mock backend with no default keyspace.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.default_keyspace = Some(keyspace.into());
        self
    }

    /// Answer statements containing `pattern` with `rows`.
    ///
    /// Later registrations take precedence over earlier ones.
    pub fn respond(&self, pattern: impl Into<String>, rows: Vec<Row>) {
        self.handle(pattern, move |_| Ok(rows.clone()));
    }

    /// Fail statements containing `pattern` with `error`.
    pub fn fail_on(&self, pattern: impl Into<String>, error: TransportError) {
        self.handle(pattern, move |_| Err(error.clone()));
    }

    /// Answer statements containing `pattern` with a handler.
    pub fn handle<F>(&self, pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Statement) -> Result<Vec<Row>, TransportError> + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.push((pattern.into(), Arc::new(handler)));
        }
    }

    /// Statements executed successfully, in order.
    pub fn executed(&self) -> Vec<Statement> {
        self.executed
            .read()
            .map(|log| log.iter().map(|(s, _)| s.clone()).collect())
            .unwrap_or_default()
    }

    pub fn executed_cql(&self) -> Vec<String> {
        self.executed().into_iter().map(|s| s.cql).collect()
    }

    /// Options passed alongside each executed statement.
    pub fn executed_options(&self) -> Vec<ExecOptions> {
        self.executed
            .read()
            .map(|log| log.iter().map(|(_, o)| o.clone()).collect())
            .unwrap_or_default()
    }

    pub fn executed_count(&self) -> usize {
        self.executed.read().map(|log| log.len()).unwrap_or(0)
    }

    /// Forget executed statements; scripted responses stay.
    pub fn clear(&self) {
        if let Ok(mut log) = self.executed.write() {
            log.clear();
        }
    }

    fn run(&self, statement: &Statement, options: &ExecOptions) -> Result<Vec<Row>, TransportError> {
        let handler = {
            let handlers = self.handlers.read().map_err(|_| poisoned())?;
            handlers
                .iter()
                .rev()
                .find(|(pattern, _)| statement.cql.contains(pattern.as_str()))
                .map(|(_, handler)| Arc::clone(handler))
        };

        let rows = match handler {
            Some(handler) => handler(statement)?,
            None => Vec::new(),
        };

        self.executed
            .write()
            .map_err(|_| poisoned())?
            .push((statement.clone(), options.clone()));
        Ok(rows)
    }
}

impl Backend for MockBackend {
    fn execute(
        &self,
        statement: &Statement,
        options: &ExecOptions,
    ) -> Result<Vec<Row>, TransportError> {
        self.run(statement, options)
    }

    fn default_keyspace(&self) -> Option<&str> {
        self.default_keyspace.as_deref()
    }
}

#[async_trait]
impl AsyncBackend for MockBackend {
    async fn execute(
        &self,
        statement: &Statement,
        options: &ExecOptions,
    ) -> Result<Vec<Row>, TransportError> {
        self.run(statement, options)
    }

    fn default_keyspace(&self) -> Option<&str> {
        self.default_keyspace.as_deref()
    }
}
