//! Pure planning shared by the blocking and suspending runners.
//!
//! Every check that can fail a call happens here, before the runner issues
//! a single migration statement.

use trellis_core::{ConfigError, MigrationError, TrellisResult};

use crate::id::MigrationId;
use crate::ledger::AppliedSet;
use crate::migration::{Migration, MigrationContext, Migrations};
use crate::report::{BlockedRollback, MigrationState, MigrationStep, StatusEntry};

/// Options of an apply call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Apply up to and including this identifier.
    pub target: Option<MigrationId>,
    pub dry_run: bool,
    pub allow_destructive: bool,
}

impl ApplyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(mut self, target: MigrationId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn allow_destructive(mut self) -> Self {
        self.allow_destructive = true;
        self
    }
}

/// Keyspace migrations run against: configured first, then the backend's.
pub fn resolve_keyspace(configured: Option<&str>, backend: Option<&str>) -> TrellisResult<String> {
    configured
        .or(backend)
        .map(str::to_string)
        .ok_or_else(|| {
            ConfigError::KeyspaceUnresolved {
                document: "migrations".to_string(),
            }
            .into()
        })
}

fn check_drift(unit: &dyn Migration, applied: &AppliedSet) -> Result<(), MigrationError> {
    match applied.get(unit.id()) {
        Some(record) if record.checksum != unit.checksum() => Err(MigrationError::ChecksumDrift {
            id: unit.id().to_string(),
            recorded: record.checksum.clone(),
            current: unit.checksum(),
        }),
        _ => Ok(()),
    }
}

/// Units to apply, ascending.
///
/// Fails on an unknown target, on drift of any unit up to the target that
/// is already recorded, on a pending unit that sorts below the newest
/// recorded one, and on a pending destructive unit without opt-in.
pub fn plan_apply<'m>(
    migrations: &'m Migrations,
    applied: &AppliedSet,
    options: &ApplyOptions,
) -> TrellisResult<Vec<&'m dyn Migration>> {
    if let Some(target) = &options.target {
        if !migrations.contains(target) {
            return Err(MigrationError::UnknownTarget {
                id: target.to_string(),
            }
            .into());
        }
    }

    let selected = migrations
        .iter()
        .filter(|unit| options.target.as_ref().map_or(true, |t| unit.id() <= t));

    let latest = applied.keys().next_back();
    let mut pending = Vec::new();
    for unit in selected {
        check_drift(unit, applied)?;
        if applied.contains_key(unit.id()) {
            continue;
        }
        if let Some(latest) = latest.filter(|latest| unit.id() < *latest) {
            return Err(MigrationError::OutOfOrder {
                id: unit.id().to_string(),
                latest: latest.to_string(),
            }
            .into());
        }
        if unit.destructive() && !options.allow_destructive {
            return Err(MigrationError::DestructiveNotAllowed {
                id: unit.id().to_string(),
            }
            .into());
        }
        pending.push(unit);
    }
    Ok(pending)
}

/// One planned rollback action.
#[derive(Debug)]
pub enum RollbackAction<'m> {
    /// `recorded` is the identifier as spelled in the ledger row.
    Revert {
        unit: &'m dyn Migration,
        recorded: MigrationId,
    },
    Blocked(BlockedRollback),
}

/// The `steps` most recently applied units, newest first. Planning stops at
/// the first unit that cannot be reverted.
pub fn plan_rollback<'m>(
    migrations: &'m Migrations,
    applied: &AppliedSet,
    steps: usize,
) -> Vec<RollbackAction<'m>> {
    let mut actions = Vec::new();
    for id in applied.keys().rev().take(steps) {
        let blocked = |reason| RollbackAction::Blocked(BlockedRollback {
            id: id.clone(),
            reason,
        });
        let action = match migrations.get(id) {
            None => blocked(MigrationError::MissingDowngrade { id: id.to_string() }),
            Some(unit) if !unit.reversible() => {
                blocked(MigrationError::Irreversible { id: id.to_string() })
            }
            Some(unit) if !unit.has_downgrade() => {
                blocked(MigrationError::MissingDowngrade { id: id.to_string() })
            }
            Some(unit) => match check_drift(unit, applied) {
                Err(reason) => blocked(reason),
                Ok(()) => RollbackAction::Revert {
                    unit,
                    recorded: id.clone(),
                },
            },
        };
        let stop = matches!(action, RollbackAction::Blocked(_));
        actions.push(action);
        if stop {
            break;
        }
    }
    actions
}

/// Record the statements of a unit's upgrade.
pub fn upgrade_step(unit: &dyn Migration, keyspace: &str) -> TrellisResult<MigrationStep> {
    let mut ctx = MigrationContext::new(keyspace);
    unit.upgrade(&mut ctx)?;
    Ok(step(unit, ctx))
}

/// Record the statements of a unit's downgrade.
pub fn downgrade_step(unit: &dyn Migration, keyspace: &str) -> TrellisResult<MigrationStep> {
    let mut ctx = MigrationContext::new(keyspace);
    unit.downgrade(&mut ctx)?;
    Ok(step(unit, ctx))
}

fn step(unit: &dyn Migration, ctx: MigrationContext) -> MigrationStep {
    MigrationStep {
        id: unit.id().clone(),
        description: unit.description().to_string(),
        statements: ctx.into_statements(),
    }
}

/// Every discovered unit plus ledger entries with no unit, ascending.
pub fn status(migrations: &Migrations, applied: &AppliedSet) -> Vec<StatusEntry> {
    let mut entries: Vec<StatusEntry> = migrations
        .iter()
        .map(|unit| {
            let record = applied.get(unit.id());
            let matches = record.map(|r| r.checksum == unit.checksum());
            let state = match matches {
                None => MigrationState::Pending,
                Some(true) => MigrationState::Applied,
                Some(false) => MigrationState::Drifted,
            };
            StatusEntry {
                id: unit.id().clone(),
                description: unit.description().to_string(),
                state,
                applied_at: record.map(|r| r.applied_at),
                checksum_matches: matches,
                reversible: Some(unit.reversible()),
                destructive: Some(unit.destructive()),
            }
        })
        .collect();

    entries.extend(
        applied
            .values()
            .filter(|record| !migrations.contains(&record.id))
            .map(|record| StatusEntry {
                id: record.id.clone(),
                description: record.description.clone(),
                state: MigrationState::Missing,
                applied_at: Some(record.applied_at),
                checksum_matches: None,
                reversible: None,
                destructive: None,
            }),
    );
    entries.sort_by(|a, b| a.id.cmp(&b.id));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AppliedMigration;
    use crate::migration::FileMigration;
    use chrono::Utc;
    use trellis_core::TrellisError;

    const REVERSIBLE: &str = r#"
[upgrade]
statements = ["CREATE TABLE {keyspace}.a (id int PRIMARY KEY)"]
[downgrade]
statements = ["DROP TABLE {keyspace}.a"]
"#;

    const ONE_WAY: &str = r#"
reversible = false
[upgrade]
statements = ["ALTER TABLE {keyspace}.a ADD b text"]
"#;

    const DESTRUCTIVE: &str = r#"
destructive = true
[upgrade]
statements = ["DROP TABLE {keyspace}.legacy"]
"#;

    fn unit(name: &str, content: &str) -> FileMigration {
        FileMigration::parse(name, content).unwrap()
    }

    fn id(raw: &str) -> MigrationId {
        MigrationId::parse(raw).unwrap()
    }

    fn record(unit: &dyn Migration) -> (MigrationId, AppliedMigration) {
        (
            unit.id().clone(),
            AppliedMigration {
                id: unit.id().clone(),
                description: unit.description().to_string(),
                checksum: unit.checksum(),
                applied_at: Utc::now(),
            },
        )
    }

    fn set() -> Migrations {
        Migrations::new()
            .with(unit("3_drop_legacy.toml", DESTRUCTIVE))
            .unwrap()
            .with(unit("1_create.toml", REVERSIBLE))
            .unwrap()
            .with(unit("2_alter.toml", ONE_WAY))
            .unwrap()
    }

    fn ids(units: &[&dyn Migration]) -> Vec<String> {
        units.iter().map(|u| u.id().to_string()).collect()
    }

    #[test]
    fn test_resolve_keyspace() {
        assert_eq!(resolve_keyspace(Some("a"), Some("b")).unwrap(), "a");
        assert_eq!(resolve_keyspace(None, Some("b")).unwrap(), "b");
        assert!(matches!(
            resolve_keyspace(None, None),
            Err(TrellisError::Config(ConfigError::KeyspaceUnresolved { .. }))
        ));
    }

    #[test]
    fn test_apply_pending_up_to_target() {
        let migrations = set();
        let pending =
            plan_apply(&migrations, &AppliedSet::new(), &ApplyOptions::new().to(id("2"))).unwrap();
        assert_eq!(ids(&pending), vec!["1", "2"]);
    }

    #[test]
    fn test_apply_skips_recorded_units() {
        let migrations = set();
        let applied: AppliedSet = [record(migrations.get(&id("1")).unwrap())].into();
        let pending =
            plan_apply(&migrations, &applied, &ApplyOptions::new().allow_destructive()).unwrap();
        assert_eq!(ids(&pending), vec!["2", "3"]);
    }

    #[test]
    fn test_apply_unknown_target() {
        assert!(matches!(
            plan_apply(&set(), &AppliedSet::new(), &ApplyOptions::new().to(id("9"))),
            Err(TrellisError::Migration(MigrationError::UnknownTarget { .. }))
        ));
    }

    #[test]
    fn test_destructive_requires_opt_in() {
        assert!(matches!(
            plan_apply(&set(), &AppliedSet::new(), &ApplyOptions::new()),
            Err(TrellisError::Migration(MigrationError::DestructiveNotAllowed { id })) if id == "3"
        ));
    }

    #[test]
    fn test_pending_unit_below_newest_applied_is_out_of_order() {
        let migrations = set();
        let applied: AppliedSet = [record(migrations.get(&id("2")).unwrap())].into();
        assert!(matches!(
            plan_apply(&migrations, &applied, &ApplyOptions::new().allow_destructive()),
            Err(TrellisError::Migration(MigrationError::OutOfOrder { id, latest }))
                if id == "1" && latest == "2"
        ));
    }

    #[test]
    fn test_drift_fails_apply() {
        let migrations = set();
        let (key, mut applied) = record(migrations.get(&id("1")).unwrap());
        applied.checksum = "0".repeat(64);
        let applied: AppliedSet = [(key, applied)].into();
        assert!(matches!(
            plan_apply(&migrations, &applied, &ApplyOptions::new().to(id("2"))),
            Err(TrellisError::Migration(MigrationError::ChecksumDrift { .. }))
        ));
    }

    #[test]
    fn test_rollback_stops_at_irreversible() {
        let migrations = set();
        let applied: AppliedSet = migrations.iter().map(record).collect();

        let actions = plan_rollback(&migrations, &applied, 3);
        // 3 has no downgrade, so nothing is reverted.
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            RollbackAction::Blocked(BlockedRollback { reason: MigrationError::MissingDowngrade { .. }, .. })
        ));

        let applied: AppliedSet = migrations
            .iter()
            .filter(|u| u.id() < &id("3"))
            .map(record)
            .collect();
        let actions = plan_rollback(&migrations, &applied, 5);
        assert!(matches!(
            &actions[0],
            RollbackAction::Blocked(BlockedRollback { reason: MigrationError::Irreversible { .. }, .. })
        ));
    }

    #[test]
    fn test_rollback_newest_first() {
        let migrations = Migrations::new()
            .with(unit("1_a.toml", REVERSIBLE))
            .unwrap()
            .with(unit("2_b.toml", REVERSIBLE))
            .unwrap();
        let applied: AppliedSet = migrations.iter().map(record).collect();
        let reverted: Vec<String> = plan_rollback(&migrations, &applied, 2)
            .into_iter()
            .filter_map(|a| match a {
                RollbackAction::Revert { recorded, .. } => Some(recorded.to_string()),
                RollbackAction::Blocked(_) => None,
            })
            .collect();
        assert_eq!(reverted, vec!["2", "1"]);
        assert_eq!(plan_rollback(&migrations, &applied, 0).len(), 0);
    }

    #[test]
    fn test_steps_record_statements() {
        let unit = unit("1_create.toml", REVERSIBLE);
        let up = upgrade_step(&unit, "shop").unwrap();
        assert_eq!(up.statements[0].cql, "CREATE TABLE shop.a (id int PRIMARY KEY)");
        let down = downgrade_step(&unit, "shop").unwrap();
        assert_eq!(down.statements[0].cql, "DROP TABLE shop.a");
    }

    #[test]
    fn test_status_states() {
        let migrations = set();
        let first = migrations.get(&id("1")).unwrap();
        let (_, mut drifted) = record(migrations.get(&id("2")).unwrap());
        drifted.checksum = "x".to_string();
        let orphan = AppliedMigration {
            id: id("0"),
            description: "gone".to_string(),
            checksum: "y".to_string(),
            applied_at: Utc::now(),
        };
        let applied: AppliedSet = [
            record(first),
            (id("2"), drifted),
            (id("0"), orphan),
        ]
        .into();

        let states: Vec<(String, MigrationState)> = status(&migrations, &applied)
            .into_iter()
            .map(|e| (e.id.to_string(), e.state))
            .collect();
        assert_eq!(
            states,
            vec![
                ("0".to_string(), MigrationState::Missing),
                ("1".to_string(), MigrationState::Applied),
                ("2".to_string(), MigrationState::Drifted),
                ("3".to_string(), MigrationState::Pending),
            ]
        );
    }
}
