//! Blocking migration runner.

use chrono::Utc;

use trellis_core::{TrellisConfig, TrellisResult};
use trellis_storage::{Backend, ExecOptions, Session};

use crate::ledger::{AppliedSet, Ledger};
use crate::migration::Migrations;
use crate::plan::{self, ApplyOptions, RollbackAction};
use crate::report::{ApplyReport, MigrationStep, RollbackReport, StatusEntry};

/// Applies and rolls back discovered migrations through a [`Session`].
pub struct MigrationRunner<B> {
    session: Session<B>,
    migrations: Migrations,
    keyspace: String,
    ledger: Ledger,
}

impl<B: Backend> MigrationRunner<B> {
    /// Runner with the default bookkeeping table.
    pub fn new(
        session: Session<B>,
        migrations: Migrations,
        keyspace: impl Into<String>,
    ) -> TrellisResult<Self> {
        let keyspace = keyspace.into();
        let ledger = Ledger::new(&keyspace, &TrellisConfig::default().migrations_table)?;
        Ok(Self {
            session,
            migrations,
            keyspace,
            ledger,
        })
    }

    /// Keyspace, bookkeeping table, and execution options from `config`.
    pub fn from_config(
        backend: B,
        migrations: Migrations,
        config: &TrellisConfig,
    ) -> TrellisResult<Self> {
        config.validate()?;
        let keyspace =
            plan::resolve_keyspace(config.default_keyspace.as_deref(), backend.default_keyspace())?;
        let session = Session::new(backend).with_options(ExecOptions::from_config(config));
        Self::new(session, migrations, keyspace)?.with_ledger_table(&config.migrations_table)
    }

    pub fn with_ledger_table(mut self, table: &str) -> TrellisResult<Self> {
        self.ledger = Ledger::new(&self.keyspace, table)?;
        Ok(self)
    }

    pub fn session(&self) -> &Session<B> {
        &self.session
    }

    pub fn migrations(&self) -> &Migrations {
        &self.migrations
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Read the ledger without writing anything; `None` if the table is
    /// missing.
    fn load_applied(&self) -> TrellisResult<Option<AppliedSet>> {
        if self.session.execute(&self.ledger.exists_query())?.is_empty() {
            return Ok(None);
        }
        let rows = self.session.execute(&self.ledger.select_statement()?)?;
        Ledger::parse_rows(&rows).map(Some)
    }

    fn run_step(&self, step: &MigrationStep) -> TrellisResult<()> {
        for statement in &step.statements {
            self.session.execute(statement).inspect_err(|e| {
                tracing::error!(migration = %step.id, cql = %statement.cql, error = %e, "migration statement failed");
            })?;
        }
        Ok(())
    }

    /// Apply pending units in ascending order.
    ///
    /// Validation (target, drift, destructive opt-in) and statement recording
    /// finish before the first write, ledger creation included. Units applied
    /// before a later failure stay recorded.
    pub fn apply(&self, options: &ApplyOptions) -> TrellisResult<ApplyReport> {
        let ledger = self.load_applied()?;
        let ledger_exists = ledger.is_some();
        let applied = ledger.unwrap_or_default();
        let pending = plan::plan_apply(&self.migrations, &applied, options)?;
        let steps = pending
            .iter()
            .map(|unit| plan::upgrade_step(*unit, &self.keyspace))
            .collect::<TrellisResult<Vec<_>>>()?;

        if !options.dry_run && !ledger_exists && !steps.is_empty() {
            self.session.execute(&self.ledger.create_statement()?)?;
        }

        let mut report = ApplyReport {
            dry_run: options.dry_run,
            applied: Vec::with_capacity(steps.len()),
        };
        for (unit, step) in pending.into_iter().zip(steps) {
            if options.dry_run {
                tracing::info!(migration = %step.id, statements = step.statements.len(), "would apply migration");
            } else {
                self.run_step(&step)?;
                self.session
                    .execute(&self.ledger.record_statement(unit, Utc::now())?)?;
                tracing::info!(migration = %step.id, description = %step.description, "applied migration");
            }
            report.applied.push(step);
        }
        Ok(report)
    }

    /// Roll back the `steps` most recently applied units, newest first.
    ///
    /// Stops at the first unit that cannot be reverted; rollbacks completed
    /// earlier in the call stay committed and the report names the blocker.
    pub fn rollback(&self, steps: usize, dry_run: bool) -> TrellisResult<RollbackReport> {
        let applied = self.load_applied()?.unwrap_or_default();
        let mut report = RollbackReport {
            dry_run,
            ..Default::default()
        };

        for action in plan::plan_rollback(&self.migrations, &applied, steps) {
            match action {
                RollbackAction::Blocked(blocked) => {
                    tracing::warn!(
                        migration = %blocked.id,
                        reason = %blocked.reason,
                        completed = report.rolled_back.len(),
                        "rollback blocked"
                    );
                    report.blocked = Some(blocked);
                }
                RollbackAction::Revert { unit, recorded } => {
                    let remove = self.ledger.remove_statement(&recorded)?;
                    let mut step = plan::downgrade_step(unit, &self.keyspace)?;
                    step.id = recorded;
                    if dry_run {
                        tracing::info!(migration = %step.id, statements = step.statements.len(), "would roll back migration");
                    } else {
                        self.run_step(&step)?;
                        self.session.execute(&remove)?;
                        tracing::info!(migration = %step.id, "rolled back migration");
                    }
                    report.rolled_back.push(step);
                }
            }
        }
        Ok(report)
    }

    pub fn status(&self) -> TrellisResult<Vec<StatusEntry>> {
        let applied = self.load_applied()?.unwrap_or_default();
        Ok(plan::status(&self.migrations, &applied))
    }
}
