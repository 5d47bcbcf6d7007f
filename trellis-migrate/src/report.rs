//! Outcomes of apply, rollback, and status.

use chrono::{DateTime, Utc};
use serde::Serialize;

use trellis_core::{MigrationError, TrellisResult};
use trellis_cql::Statement;

use crate::id::MigrationId;

/// One unit that ran (or would run, on a dry run).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStep {
    pub id: MigrationId,
    pub description: String,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    pub dry_run: bool,
    pub applied: Vec<MigrationStep>,
}

impl ApplyReport {
    pub fn ids(&self) -> Vec<&MigrationId> {
        self.applied.iter().map(|step| &step.id).collect()
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// The unit that stopped a rollback, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockedRollback {
    pub id: MigrationId,
    pub reason: MigrationError,
}

/// Result of a rollback call.
///
/// A blocked rollback is still a report, not an error: everything in
/// `rolled_back` stays committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollbackReport {
    pub dry_run: bool,
    pub rolled_back: Vec<MigrationStep>,
    pub blocked: Option<BlockedRollback>,
}

impl RollbackReport {
    pub fn ids(&self) -> Vec<&MigrationId> {
        self.rolled_back.iter().map(|step| &step.id).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.blocked.is_none()
    }

    /// Committed identifiers, or `RollbackBlocked` naming the blocking unit.
    pub fn into_result(self) -> TrellisResult<Vec<MigrationId>> {
        let completed: Vec<MigrationId> = self.rolled_back.into_iter().map(|s| s.id).collect();
        match self.blocked {
            None => Ok(completed),
            Some(blocked) => Err(MigrationError::RollbackBlocked {
                id: blocked.id.to_string(),
                completed: completed.iter().map(|id| id.to_string()).collect(),
                reason: blocked.reason.to_string(),
            }
            .into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Pending,
    Applied,
    /// Applied, but the content changed since.
    Drifted,
    /// Recorded in the ledger with no discovered unit.
    Missing,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::Pending => "pending",
            MigrationState::Applied => "applied",
            MigrationState::Drifted => "drifted",
            MigrationState::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    pub id: MigrationId,
    pub description: String,
    pub state: MigrationState,
    pub applied_at: Option<DateTime<Utc>>,
    pub checksum_matches: Option<bool>,
    pub reversible: Option<bool>,
    pub destructive: Option<bool>,
}
