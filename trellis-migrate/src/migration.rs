//! Migration units and their execution context.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use trellis_core::{compute_checksum, Checksum, MigrationError, TrellisResult};
use trellis_cql::Statement;

use crate::id::MigrationId;

// ============================================================================
// CONTEXT
// ============================================================================

/// Records the statements a unit issues.
///
/// The runner decides what happens to them: executed in order on a real run,
/// reported untouched on a dry run.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    keyspace: String,
    statements: Vec<Statement>,
}

impl MigrationContext {
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            statements: Vec::new(),
        }
    }

    /// Keyspace the migration runs against.
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn execute(&mut self, statement: Statement) -> &mut Self {
        self.statements.push(statement);
        self
    }

    /// Issue raw statement text. `{keyspace}` is replaced with the target
    /// keyspace.
    pub fn cql(&mut self, text: &str) -> &mut Self {
        let text = text.replace("{keyspace}", &self.keyspace);
        self.execute(Statement::raw(text, Vec::new()))
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }
}

// ============================================================================
// MIGRATION TRAIT
// ============================================================================

/// One migration unit.
pub trait Migration: Send + Sync {
    fn id(&self) -> &MigrationId;

    fn description(&self) -> &str;

    /// Content checksum, compared with the recorded one before the unit is
    /// treated as applied.
    fn checksum(&self) -> Checksum;

    fn reversible(&self) -> bool {
        true
    }

    fn destructive(&self) -> bool {
        false
    }

    fn has_downgrade(&self) -> bool;

    fn upgrade(&self, ctx: &mut MigrationContext) -> TrellisResult<()>;

    fn downgrade(&self, ctx: &mut MigrationContext) -> TrellisResult<()>;
}

impl fmt::Debug for dyn Migration + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id().as_str())
            .field("description", &self.description())
            .finish()
    }
}

// ============================================================================
// FILE MIGRATIONS
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StatementList {
    #[serde(default)]
    statements: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct MigrationFile {
    #[serde(default)]
    description: String,
    #[serde(default = "default_true")]
    reversible: bool,
    #[serde(default)]
    destructive: bool,
    upgrade: StatementList,
    downgrade: Option<StatementList>,
}

fn default_true() -> bool {
    true
}

/// Migration declared in a `<id>_<slug>.toml` file:
///
/// ```toml
/// description = "create reviews"
/// destructive = false
///
/// [upgrade]
/// statements = ["CREATE TABLE IF NOT EXISTS {keyspace}.reviews (...)"]
///
/// [downgrade]
/// statements = ["DROP TABLE IF EXISTS {keyspace}.reviews"]
/// ```
#[derive(Debug, Clone)]
pub struct FileMigration {
    id: MigrationId,
    slug: String,
    path: PathBuf,
    checksum: Checksum,
    file: MigrationFile,
}

impl FileMigration {
    /// Parse a migration from its file name and content.
    pub fn parse(file_name: &str, content: &str) -> TrellisResult<Self> {
        let stem = file_name.strip_suffix(".toml").unwrap_or(file_name);
        let (id, slug) = MigrationId::split_stem(stem)?;
        let file: MigrationFile = toml::from_str(content).map_err(|e| MigrationError::Parse {
            name: file_name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            id,
            slug,
            path: PathBuf::from(file_name),
            checksum: compute_checksum(content.as_bytes()),
            file,
        })
    }

    /// Read and parse one migration file.
    pub fn load(path: &Path) -> TrellisResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MigrationError::InvalidFileName {
                name: path.display().to_string(),
            })?;
        let mut migration = Self::parse(file_name, &content)?;
        migration.path = path.to_path_buf();
        Ok(migration)
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Migration for FileMigration {
    fn id(&self) -> &MigrationId {
        &self.id
    }

    fn description(&self) -> &str {
        if self.file.description.is_empty() {
            &self.slug
        } else {
            &self.file.description
        }
    }

    fn checksum(&self) -> Checksum {
        self.checksum.clone()
    }

    fn reversible(&self) -> bool {
        self.file.reversible
    }

    fn destructive(&self) -> bool {
        self.file.destructive
    }

    fn has_downgrade(&self) -> bool {
        self.file
            .downgrade
            .as_ref()
            .is_some_and(|d| !d.statements.is_empty())
    }

    fn upgrade(&self, ctx: &mut MigrationContext) -> TrellisResult<()> {
        for text in &self.file.upgrade.statements {
            ctx.cql(text);
        }
        Ok(())
    }

    fn downgrade(&self, ctx: &mut MigrationContext) -> TrellisResult<()> {
        let downgrade = self.file.downgrade.as_ref().ok_or_else(|| {
            MigrationError::MissingDowngrade {
                id: self.id.to_string(),
            }
        })?;
        for text in &downgrade.statements {
            ctx.cql(text);
        }
        Ok(())
    }
}

fn io_error(path: &Path, e: std::io::Error) -> MigrationError {
    MigrationError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

// ============================================================================
// MIGRATION SET
// ============================================================================

/// Discovered units in ascending identifier order.
#[derive(Default)]
pub struct Migrations {
    units: BTreeMap<MigrationId, Box<dyn Migration>>,
}

impl fmt::Debug for Migrations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.units.keys().map(|id| id.as_str())).finish()
    }
}

impl Migrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.toml` file in `dir`. Other entries are ignored.
    pub fn discover(dir: &Path) -> TrellisResult<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| io_error(dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(dir, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut migrations = Self::new();
        for path in paths {
            migrations.add(Box::new(FileMigration::load(&path)?))?;
        }
        tracing::debug!(dir = %dir.display(), count = migrations.len(), "discovered migrations");
        Ok(migrations)
    }

    /// Register a unit; fails on an identifier already present.
    pub fn add(&mut self, unit: Box<dyn Migration>) -> TrellisResult<&mut Self> {
        let id = unit.id().clone();
        if self.units.contains_key(&id) {
            return Err(MigrationError::DuplicateId { id: id.to_string() }.into());
        }
        self.units.insert(id, unit);
        Ok(self)
    }

    pub fn with(mut self, unit: impl Migration + 'static) -> TrellisResult<Self> {
        self.add(Box::new(unit))?;
        Ok(self)
    }

    pub fn get(&self, id: &MigrationId) -> Option<&dyn Migration> {
        self.units.get(id).map(|unit| unit.as_ref())
    }

    pub fn contains(&self, id: &MigrationId) -> bool {
        self.units.contains_key(id)
    }

    /// Units in ascending identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Migration> {
        self.units.values().map(|unit| unit.as_ref())
    }

    pub fn ids(&self) -> Vec<&MigrationId> {
        self.units.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
