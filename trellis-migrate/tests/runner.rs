//! End-to-end runner behavior over on-disk migration directories.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use trellis_core::{compute_checksum, Checksum, Document, MigrationError, TrellisError, TrellisResult};
use trellis_cql::{create_schema, drop_table, TableRef};
use trellis_migrate::{
    ApplyOptions, FileMigration, Migration, MigrationContext, MigrationId, MigrationRunner,
    MigrationState, Migrations,
};
use trellis_storage::Session;
use trellis_test_utils::fixtures::Review;
use trellis_test_utils::{LedgerEmulator, MockBackend};

const TABLE: &str = "schema_migrations";

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn create(table: &str) -> String {
    format!(
        "description = \"create {table}\"\n\
         [upgrade]\n\
         statements = [\"CREATE TABLE IF NOT EXISTS {{keyspace}}.{table} (id int PRIMARY KEY)\"]\n\
         [downgrade]\n\
         statements = [\"DROP TABLE IF EXISTS {{keyspace}}.{table}\"]\n"
    )
}

const ONE_WAY: &str = r#"
description = "backfill"
reversible = false

[upgrade]
statements = ["UPDATE {keyspace}.a SET v = 1 WHERE id = 1"]
"#;

const DESTRUCTIVE: &str = r#"
description = "drop legacy"
destructive = true

[upgrade]
statements = ["DROP TABLE IF EXISTS {keyspace}.legacy"]
"#;

struct Harness {
    dir: TempDir,
    backend: MockBackend,
    ledger: LedgerEmulator,
}

impl Harness {
    fn new() -> Self {
        let backend = MockBackend::new();
        let ledger = LedgerEmulator::install(&backend, TABLE);
        Self {
            dir: tempfile::tempdir().unwrap(),
            backend,
            ledger,
        }
    }

    fn write(&self, name: &str, content: &str) {
        write(self.dir.path(), name, content);
    }

    fn runner(&self) -> MigrationRunner<MockBackend> {
        let migrations = Migrations::discover(self.dir.path()).unwrap();
        MigrationRunner::new(Session::new(self.backend.clone()), migrations, "shop").unwrap()
    }

    /// Migration statements only, without bookkeeping traffic.
    fn migration_cql(&self) -> Vec<String> {
        self.backend
            .executed_cql()
            .into_iter()
            .filter(|cql| !cql.contains(TABLE) && !cql.contains("system_schema"))
            .collect()
    }
}

#[test]
fn test_reverse_directory_order_still_applies_ascending() {
    let h = Harness::new();
    h.write("20260102_001_create_b.toml", &create("b"));
    h.write("20260101_001_create_a.toml", &create("a"));

    let report = h.runner().apply(&ApplyOptions::new()).unwrap();
    let ids: Vec<&str> = report.ids().iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, vec!["20260101_001", "20260102_001"]);
    assert_eq!(
        h.migration_cql(),
        vec![
            "CREATE TABLE IF NOT EXISTS shop.a (id int PRIMARY KEY)",
            "CREATE TABLE IF NOT EXISTS shop.b (id int PRIMARY KEY)",
        ]
    );
    assert_eq!(h.ledger.ids(), vec!["20260101_001", "20260102_001"]);
}

#[test]
fn test_second_apply_is_a_noop() {
    let h = Harness::new();
    h.write("1_create_a.toml", &create("a"));
    h.runner().apply(&ApplyOptions::new()).unwrap();
    h.backend.clear();

    let report = h.runner().apply(&ApplyOptions::new()).unwrap();
    assert!(report.is_noop());
    assert!(h.migration_cql().is_empty());
}

#[test]
fn test_editing_applied_migration_is_checksum_drift() {
    let h = Harness::new();
    h.write("20260101_001_create_a.toml", &create("a"));
    h.runner().apply(&ApplyOptions::new()).unwrap();

    h.write("20260101_001_create_a.toml", &create("a_renamed"));
    h.write("20260102_001_create_b.toml", &create("b"));
    h.backend.clear();

    let result = h.runner().apply(&ApplyOptions::new());
    match result {
        Err(TrellisError::Migration(MigrationError::ChecksumDrift { id, .. })) => {
            assert_eq!(id, "20260101_001");
        }
        other => panic!("expected drift, got {other:?}"),
    }
    assert!(h.migration_cql().is_empty());
    assert_eq!(h.ledger.ids(), vec!["20260101_001"]);

    let status = h.runner().status().unwrap();
    assert_eq!(status[0].state, MigrationState::Drifted);
    assert_eq!(status[1].state, MigrationState::Pending);
}

#[test]
fn test_target_limits_application() {
    let h = Harness::new();
    h.write("1_create_a.toml", &create("a"));
    h.write("2_create_b.toml", &create("b"));
    h.write("3_create_c.toml", &create("c"));

    let target = MigrationId::parse("2").unwrap();
    let report = h.runner().apply(&ApplyOptions::new().to(target)).unwrap();
    assert_eq!(report.applied.len(), 2);
    assert_eq!(h.ledger.ids(), vec!["1", "2"]);

    let unknown = MigrationId::parse("7").unwrap();
    assert!(matches!(
        h.runner().apply(&ApplyOptions::new().to(unknown)),
        Err(TrellisError::Migration(MigrationError::UnknownTarget { .. }))
    ));
}

#[test]
fn test_late_unit_below_applied_is_rejected() {
    let h = Harness::new();
    h.write("20260102_001_create_b.toml", &create("b"));
    h.runner().apply(&ApplyOptions::new()).unwrap();

    h.write("20260101_001_create_a.toml", &create("a"));
    h.write("20260103_001_create_c.toml", &create("c"));
    h.backend.clear();

    match h.runner().apply(&ApplyOptions::new()) {
        Err(TrellisError::Migration(MigrationError::OutOfOrder { id, latest })) => {
            assert_eq!(id, "20260101_001");
            assert_eq!(latest, "20260102_001");
        }
        other => panic!("expected out-of-order rejection, got {other:?}"),
    }
    assert!(h.migration_cql().is_empty());
    assert_eq!(h.ledger.ids(), vec!["20260102_001"]);

    let status = h.runner().status().unwrap();
    assert_eq!(status[0].state, MigrationState::Pending);
    assert_eq!(status[1].state, MigrationState::Applied);

    // The newest recorded unit is still the one a rollback reverts.
    let ids = h.runner().rollback(1, false).unwrap().into_result().unwrap();
    assert_eq!(ids, vec![MigrationId::parse("20260102_001").unwrap()]);
    assert!(h.ledger.ids().is_empty());
}

#[test]
fn test_rollback_removes_recorded_identifier_spelling() {
    let h = Harness::new();
    h.write("001_create_a.toml", &create("a"));
    h.runner().apply(&ApplyOptions::new()).unwrap();
    assert_eq!(h.ledger.ids(), vec!["001"]);

    fs::remove_file(h.dir.path().join("001_create_a.toml")).unwrap();
    h.write("1_create_a.toml", &create("a"));

    let ids = h.runner().rollback(1, false).unwrap().into_result().unwrap();
    assert_eq!(ids[0].as_str(), "001");
    assert!(h.ledger.ids().is_empty());
}

#[test]
fn test_partial_rollback_keeps_completed_steps() {
    let h = Harness::new();
    h.write("1_create_a.toml", &create("a"));
    h.write("2_backfill.toml", ONE_WAY);
    h.write("3_create_c.toml", &create("c"));
    h.runner().apply(&ApplyOptions::new()).unwrap();
    h.backend.clear();

    let report = h.runner().rollback(3, false).unwrap();
    let rolled_back: Vec<&str> = report.ids().iter().map(|id| id.as_str()).collect();
    assert_eq!(rolled_back, vec!["3"]);
    let blocked = report.blocked.clone().unwrap();
    assert_eq!(blocked.id.as_str(), "2");
    assert!(matches!(blocked.reason, MigrationError::Irreversible { .. }));

    // Only the completed downgrade ran; the blocked unit issued nothing.
    assert_eq!(h.migration_cql(), vec!["DROP TABLE IF EXISTS shop.c"]);
    assert_eq!(h.ledger.ids(), vec!["1", "2"]);

    match report.into_result() {
        Err(TrellisError::Migration(MigrationError::RollbackBlocked { id, completed, .. })) => {
            assert_eq!(id, "2");
            assert_eq!(completed, vec!["3".to_string()]);
        }
        other => panic!("expected blocked rollback, got {other:?}"),
    }
}

#[test]
fn test_rollback_steps_newest_first() {
    let h = Harness::new();
    h.write("1_create_a.toml", &create("a"));
    h.write("2_create_b.toml", &create("b"));
    h.write("3_create_c.toml", &create("c"));
    h.runner().apply(&ApplyOptions::new()).unwrap();
    h.backend.clear();

    let ids = h.runner().rollback(2, false).unwrap().into_result().unwrap();
    assert_eq!(ids, vec![MigrationId::parse("3").unwrap(), MigrationId::parse("2").unwrap()]);
    assert_eq!(
        h.migration_cql(),
        vec!["DROP TABLE IF EXISTS shop.c", "DROP TABLE IF EXISTS shop.b"]
    );
    assert_eq!(h.ledger.ids(), vec!["1"]);
}

#[test]
fn test_destructive_requires_opt_in() {
    let h = Harness::new();
    h.write("1_create_a.toml", &create("a"));
    h.write("2_drop_legacy.toml", DESTRUCTIVE);

    let result = h.runner().apply(&ApplyOptions::new());
    assert!(matches!(
        result,
        Err(TrellisError::Migration(MigrationError::DestructiveNotAllowed { id })) if id == "2"
    ));
    // Nothing ran, not even the safe unit ahead of it.
    assert!(h.migration_cql().is_empty());
    assert!(!h.ledger.is_created());

    h.runner()
        .apply(&ApplyOptions::new().allow_destructive())
        .unwrap();
    assert_eq!(h.ledger.ids(), vec!["1", "2"]);
}

#[test]
fn test_dry_run_executes_and_records_nothing() {
    let h = Harness::new();
    h.write("1_create_a.toml", &create("a"));
    h.write("2_create_b.toml", &create("b"));

    let report = h.runner().apply(&ApplyOptions::new().dry_run()).unwrap();
    assert!(report.dry_run);
    assert_eq!(report.applied.len(), 2);
    assert_eq!(
        report.applied[0].statements[0].cql,
        "CREATE TABLE IF NOT EXISTS shop.a (id int PRIMARY KEY)"
    );
    assert!(h.migration_cql().is_empty());
    assert!(!h.ledger.is_created());

    h.runner().apply(&ApplyOptions::new()).unwrap();
    h.backend.clear();
    let report = h.runner().rollback(1, true).unwrap();
    assert_eq!(report.rolled_back[0].statements[0].cql, "DROP TABLE IF EXISTS shop.b");
    assert!(h.migration_cql().is_empty());
    assert_eq!(h.ledger.ids(), vec!["1", "2"]);
}

#[test]
fn test_discovery_errors() {
    let h = Harness::new();
    h.write("README.md", "not a migration");
    h.write("1_create_a.toml", &create("a"));
    assert_eq!(Migrations::discover(h.dir.path()).unwrap().len(), 1);

    h.write("001_create_again.toml", &create("a"));
    assert!(matches!(
        Migrations::discover(h.dir.path()),
        Err(TrellisError::Migration(MigrationError::DuplicateId { .. }))
    ));

    let other = tempfile::tempdir().unwrap();
    write(other.path(), "create_a.toml", &create("a"));
    assert!(matches!(
        Migrations::discover(other.path()),
        Err(TrellisError::Migration(MigrationError::InvalidFileName { .. }))
    ));

    assert!(matches!(
        Migrations::discover(&other.path().join("missing")),
        Err(TrellisError::Migration(MigrationError::Io { .. }))
    ));
}

// ============================================================================
// PROGRAMMATIC UNITS
// ============================================================================

struct CreateReviews {
    id: MigrationId,
}

impl Migration for CreateReviews {
    fn id(&self) -> &MigrationId {
        &self.id
    }

    fn description(&self) -> &str {
        "reviews table from its document"
    }

    fn checksum(&self) -> Checksum {
        compute_checksum(b"create_reviews:v1")
    }

    fn has_downgrade(&self) -> bool {
        true
    }

    fn upgrade(&self, ctx: &mut MigrationContext) -> TrellisResult<()> {
        let schema = Review::schema()?;
        let table = TableRef::for_schema(&schema, Some(ctx.keyspace()))?;
        for statement in create_schema(&schema, &table)? {
            ctx.execute(statement);
        }
        Ok(())
    }

    fn downgrade(&self, ctx: &mut MigrationContext) -> TrellisResult<()> {
        let schema = Review::schema()?;
        let table = TableRef::for_schema(&schema, Some(ctx.keyspace()))?;
        ctx.execute(drop_table(&table));
        Ok(())
    }
}

#[test]
fn test_programmatic_units_mix_with_files() {
    let h = Harness::new();
    h.write("1_create_a.toml", &create("a"));

    let mut migrations = Migrations::discover(h.dir.path()).unwrap();
    migrations
        .add(Box::new(CreateReviews {
            id: MigrationId::parse("2").unwrap(),
        }))
        .unwrap();
    let runner = MigrationRunner::new(Session::new(h.backend.clone()), migrations, "shop").unwrap();

    runner.apply(&ApplyOptions::new()).unwrap();
    let cql = h.migration_cql();
    assert_eq!(cql.len(), 3);
    assert!(cql[1].starts_with("CREATE TABLE IF NOT EXISTS shop.reviews"));
    assert!(cql[2].starts_with("CREATE INDEX IF NOT EXISTS"));
    assert_eq!(h.ledger.ids(), vec!["1", "2"]);

    runner.rollback(1, false).unwrap().into_result().unwrap();
    assert!(h
        .migration_cql()
        .last()
        .unwrap()
        .starts_with("DROP TABLE IF EXISTS shop.reviews"));
}

#[test]
fn test_file_migration_loads_with_path() {
    let h = Harness::new();
    h.write("5_create_a.toml", &create("a"));
    let unit = FileMigration::load(&h.dir.path().join("5_create_a.toml")).unwrap();
    assert_eq!(unit.slug(), "create_a");
    assert!(unit.path().ends_with("5_create_a.toml"));
    assert_eq!(unit.description(), "create a");
}
