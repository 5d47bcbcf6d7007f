//! trellis-migrate - apply, roll back, and inspect schema migrations
//!
//! Usage:
//!   trellis-migrate --keyspace shop --dir migrations apply --dry-run
//!   trellis-migrate --keyspace shop rollback --steps 2
//!   trellis-migrate --keyspace shop status --json
//!
//! This build carries no wire client: it runs against a script backend that
//! prints every schema and data statement it is asked to execute, so the
//! output can be reviewed or piped into `cqlsh`.

use clap::Parser;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Mutex;

use trellis_core::{MigrationError, Row, TransportError, TrellisError};
use trellis_cql::{Statement, StatementKind};
use trellis_migrate::cli::{self, Cli};
use trellis_storage::{Backend, ExecOptions};

/// Prints mutations and DDL to stdout; reads return no rows.
struct ScriptBackend {
    out: Mutex<std::io::Stdout>,
}

impl Backend for ScriptBackend {
    fn execute(
        &self,
        statement: &Statement,
        _options: &ExecOptions,
    ) -> Result<Vec<Row>, TransportError> {
        if statement.kind == StatementKind::Select {
            return Ok(Vec::new());
        }
        let mut out = self
            .out
            .lock()
            .map_err(|_| TransportError::new("script output lock poisoned"))?;
        if !statement.params.is_empty() {
            writeln!(out, "-- params: {:?}", statement.params)
                .map_err(|e| TransportError::new(e.to_string()))?;
        }
        writeln!(out, "{};", statement.cql).map_err(|e| TransportError::new(e.to_string()))?;
        Ok(Vec::new())
    }

    fn default_keyspace(&self) -> Option<&str> {
        None
    }
}

fn main() -> ExitCode {
    cli::init_tracing();
    let args = Cli::parse();

    let connect = |config: &trellis_core::TrellisConfig| {
        tracing::info!(hosts = ?config.hosts, port = config.port, "using script backend");
        Ok::<_, TrellisError>(ScriptBackend {
            out: Mutex::new(std::io::stdout()),
        })
    };

    match cli::run(&args, connect, &mut std::io::stdout()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(TrellisError::Migration(e @ MigrationError::RollbackBlocked { .. })) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
