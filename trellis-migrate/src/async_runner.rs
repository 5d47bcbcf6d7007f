//! Suspending migration runner. Same planning and semantics as
//! [`MigrationRunner`](crate::MigrationRunner); execution awaits.

use chrono::Utc;

use trellis_core::{TrellisConfig, TrellisResult};
use trellis_storage::{AsyncBackend, AsyncSession, ExecOptions};

use crate::ledger::{AppliedSet, Ledger};
use crate::migration::Migrations;
use crate::plan::{self, ApplyOptions, RollbackAction};
use crate::report::{ApplyReport, MigrationStep, RollbackReport, StatusEntry};

pub struct AsyncMigrationRunner<B> {
    session: AsyncSession<B>,
    migrations: Migrations,
    keyspace: String,
    ledger: Ledger,
}

impl<B: AsyncBackend> AsyncMigrationRunner<B> {
    pub fn new(
        session: AsyncSession<B>,
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

    pub fn from_config(
        backend: B,
        migrations: Migrations,
        config: &TrellisConfig,
    ) -> TrellisResult<Self> {
        config.validate()?;
        let keyspace =
            plan::resolve_keyspace(config.default_keyspace.as_deref(), backend.default_keyspace())?;
        let session = AsyncSession::new(backend).with_options(ExecOptions::from_config(config));
        Self::new(session, migrations, keyspace)?.with_ledger_table(&config.migrations_table)
    }

    pub fn with_ledger_table(mut self, table: &str) -> TrellisResult<Self> {
        self.ledger = Ledger::new(&self.keyspace, table)?;
        Ok(self)
    }

    pub fn session(&self) -> &AsyncSession<B> {
        &self.session
    }

    pub fn migrations(&self) -> &Migrations {
        &self.migrations
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    async fn load_applied(&self) -> TrellisResult<Option<AppliedSet>> {
        let probe = self.session.execute(&self.ledger.exists_query()).await?;
        if probe.is_empty() {
            return Ok(None);
        }
        let rows = self.session.execute(&self.ledger.select_statement()?).await?;
        Ledger::parse_rows(&rows).map(Some)
    }

    async fn run_step(&self, step: &MigrationStep) -> TrellisResult<()> {
        for statement in &step.statements {
            if let Err(e) = self.session.execute(statement).await {
                tracing::error!(migration = %step.id, cql = %statement.cql, error = %e, "migration statement failed");
                return Err(e);
            }
        }
        Ok(())
    }

    pub async fn apply(&self, options: &ApplyOptions) -> TrellisResult<ApplyReport> {
        let ledger = self.load_applied().await?;
        let ledger_exists = ledger.is_some();
        let applied = ledger.unwrap_or_default();
        let pending = plan::plan_apply(&self.migrations, &applied, options)?;
        let steps = pending
            .iter()
            .map(|unit| plan::upgrade_step(*unit, &self.keyspace))
            .collect::<TrellisResult<Vec<_>>>()?;

        if !options.dry_run && !ledger_exists && !steps.is_empty() {
            let create = self.ledger.create_statement()?;
            self.session.execute(&create).await?;
        }

        let mut report = ApplyReport {
            dry_run: options.dry_run,
            applied: Vec::with_capacity(steps.len()),
        };
        for (unit, step) in pending.into_iter().zip(steps) {
            if options.dry_run {
                tracing::info!(migration = %step.id, statements = step.statements.len(), "would apply migration");
            } else {
                self.run_step(&step).await?;
                let record = self.ledger.record_statement(unit, Utc::now())?;
                self.session.execute(&record).await?;
                tracing::info!(migration = %step.id, description = %step.description, "applied migration");
            }
            report.applied.push(step);
        }
        Ok(report)
    }

    pub async fn rollback(&self, steps: usize, dry_run: bool) -> TrellisResult<RollbackReport> {
        let applied = self.load_applied().await?.unwrap_or_default();
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
                        self.run_step(&step).await?;
                        self.session.execute(&remove).await?;
                        tracing::info!(migration = %step.id, "rolled back migration");
                    }
                    report.rolled_back.push(step);
                }
            }
        }
        Ok(report)
    }

    pub async fn status(&self) -> TrellisResult<Vec<StatusEntry>> {
        let applied = self.load_applied().await?.unwrap_or_default();
        Ok(plan::status(&self.migrations, &applied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::FileMigration;
    use trellis_core::{MigrationError, TrellisError};
    use trellis_storage::MockBackend;

    const DESTRUCTIVE: &str = r#"
destructive = true
[upgrade]
statements = ["DROP TABLE {keyspace}.legacy"]
"#;

    fn runner() -> AsyncMigrationRunner<MockBackend> {
        let migrations = Migrations::new()
            .with(FileMigration::parse("1_drop_legacy.toml", DESTRUCTIVE).unwrap())
            .unwrap();
        AsyncMigrationRunner::new(AsyncSession::new(MockBackend::new()), migrations, "shop")
            .unwrap()
    }

    #[tokio::test]
    async fn test_destructive_fails_before_any_migration_statement() {
        let runner = runner();
        let result = runner.apply(&ApplyOptions::new()).await;
        assert!(matches!(
            result,
            Err(TrellisError::Migration(MigrationError::DestructiveNotAllowed { .. }))
        ));
        assert!(!runner
            .session()
            .backend()
            .executed_cql()
            .iter()
            .any(|cql| cql.contains("legacy")));
    }

    #[tokio::test]
    async fn test_destructive_with_opt_in() {
        let runner = runner();
        let report = runner
            .apply(&ApplyOptions::new().allow_destructive())
            .await
            .unwrap();
        assert_eq!(report.ids().len(), 1);
        assert!(runner
            .session()
            .backend()
            .executed_cql()
            .contains(&"DROP TABLE shop.legacy".to_string()));
    }

    #[tokio::test]
    async fn test_rollback_with_empty_ledger_is_noop() {
        let runner = runner();
        let report = runner.rollback(3, false).await.unwrap();
        assert!(report.rolled_back.is_empty());
        assert!(report.is_complete());
        assert_eq!(runner.status().await.unwrap().len(), 1);
    }
}
