//! Command-line surface: `apply`, `rollback`, and `status`.
//!
//! [`run`] is generic over the execution backend; the caller decides how a
//! configuration turns into a connection.

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use trellis_core::{MigrationError, TrellisConfig, TrellisError, TrellisResult};
use trellis_storage::Backend;

use crate::id::MigrationId;
use crate::migration::Migrations;
use crate::plan::ApplyOptions;
use crate::report::{ApplyReport, MigrationStep, RollbackReport, StatusEntry};
use crate::runner::MigrationRunner;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "trellis-migrate",
    version,
    about = "Apply, roll back, and inspect schema migrations"
)]
pub struct Cli {
    /// Keyspace the migrations run against
    #[arg(long, global = true)]
    pub keyspace: Option<String>,

    /// Contact point; repeat or comma-separate for several
    #[arg(long = "host", global = true, value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Directory holding `<id>_<slug>.toml` migration files
    #[arg(long, global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// TOML configuration file; TRELLIS_* variables are used without one
    #[arg(long, global = true, value_name = "FILE", env = "TRELLIS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Apply pending migrations in ascending order
    Apply {
        /// Stop after this migration identifier
        #[arg(long)]
        target: Option<String>,
        /// Print the statements without executing them
        #[arg(long)]
        dry_run: bool,
        /// Permit migrations marked destructive
        #[arg(long)]
        allow_destructive: bool,
    },
    /// Roll back the most recently applied migrations
    Rollback {
        #[arg(long, default_value_t = 1)]
        steps: usize,
        #[arg(long)]
        dry_run: bool,
    },
    /// List migrations and their applied state
    Status {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Configuration file (or environment), then command-line overrides.
    pub fn resolve_config(&self) -> TrellisResult<TrellisConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|e| MigrationError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                TrellisConfig::from_toml_str(&source)?
            }
            None => TrellisConfig::from_env(),
        };
        if let Some(keyspace) = &self.keyspace {
            config.default_keyspace = Some(keyspace.clone());
        }
        if !self.hosts.is_empty() {
            config.hosts = self.hosts.clone();
        }
        if let Some(dir) = &self.dir {
            config.migrations_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Install the `tracing` subscriber. `TRELLIS_LOG` wins over `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("TRELLIS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn output_error(e: std::io::Error) -> TrellisError {
    MigrationError::Io {
        path: "<output>".to_string(),
        reason: e.to_string(),
    }
    .into()
}

/// Run one command.
///
/// A blocked rollback writes its report and then returns
/// `MigrationError::RollbackBlocked`.
pub fn run<B, F, W>(cli: &Cli, connect: F, out: &mut W) -> TrellisResult<()>
where
    B: Backend,
    F: FnOnce(&TrellisConfig) -> TrellisResult<B>,
    W: Write,
{
    let config = cli.resolve_config()?;
    let migrations = Migrations::discover(&config.migrations_dir)?;
    let runner = MigrationRunner::from_config(connect(&config)?, migrations, &config)?;

    match &cli.command {
        Command::Apply {
            target,
            dry_run,
            allow_destructive,
        } => {
            let options = ApplyOptions {
                target: target.as_deref().map(MigrationId::parse).transpose()?,
                dry_run: *dry_run,
                allow_destructive: *allow_destructive,
            };
            let report = runner.apply(&options)?;
            write_apply(out, &report).map_err(output_error)
        }
        Command::Rollback { steps, dry_run } => {
            let report = runner.rollback(*steps, *dry_run)?;
            write_rollback(out, &report).map_err(output_error)?;
            report.into_result().map(|_| ())
        }
        Command::Status { json } => {
            let entries = runner.status()?;
            if *json {
                let rendered = serde_json::to_string_pretty(&entries).map_err(|e| {
                    MigrationError::Io {
                        path: "<output>".to_string(),
                        reason: e.to_string(),
                    }
                })?;
                writeln!(out, "{}", rendered).map_err(output_error)
            } else {
                write_status(out, &entries).map_err(output_error)
            }
        }
    }
}

fn write_steps<W: Write>(
    out: &mut W,
    verb: &str,
    steps: &[MigrationStep],
    dry_run: bool,
) -> std::io::Result<()> {
    for step in steps {
        writeln!(out, "{} {} {}", verb, step.id, step.description)?;
        if dry_run {
            for statement in &step.statements {
                writeln!(out, "    {};", statement.cql)?;
            }
        }
    }
    Ok(())
}

fn write_apply<W: Write>(out: &mut W, report: &ApplyReport) -> std::io::Result<()> {
    if report.is_noop() {
        return writeln!(out, "nothing to apply");
    }
    let verb = if report.dry_run { "would apply" } else { "applied" };
    write_steps(out, verb, &report.applied, report.dry_run)
}

fn write_rollback<W: Write>(out: &mut W, report: &RollbackReport) -> std::io::Result<()> {
    let verb = if report.dry_run { "would roll back" } else { "rolled back" };
    write_steps(out, verb, &report.rolled_back, report.dry_run)?;
    if let Some(blocked) = &report.blocked {
        writeln!(out, "blocked at {}: {}", blocked.id, blocked.reason)?;
    } else if report.rolled_back.is_empty() {
        writeln!(out, "nothing to roll back")?;
    }
    Ok(())
}

fn write_status<W: Write>(out: &mut W, entries: &[StatusEntry]) -> std::io::Result<()> {
    for entry in entries {
        let applied_at = entry
            .applied_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:<24} {:<8} {:<19} {}",
            entry.id.as_str(),
            entry.state.as_str(),
            applied_at,
            entry.description
        )?;
    }
    Ok(())
}
