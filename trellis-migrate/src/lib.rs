//! TRELLIS Migrate - Checksum-Verified Schema Migrations
//!
//! Discovers migration units, orders them by identifier, and applies or
//! rolls them back through an execution backend, recording each applied
//! unit with its content checksum in a bookkeeping table.
//!
//! Planning is pure and shared ([`plan`]); [`MigrationRunner`] and
//! [`AsyncMigrationRunner`] differ only in how statements are executed.

pub mod async_runner;
pub mod cli;
pub mod id;
pub mod ledger;
pub mod migration;
pub mod plan;
pub mod report;
pub mod runner;

pub use async_runner::AsyncMigrationRunner;
pub use id::MigrationId;
pub use ledger::{AppliedMigration, AppliedSet, Ledger};
pub use migration::{FileMigration, Migration, MigrationContext, Migrations};
pub use plan::ApplyOptions;
pub use report::{
    ApplyReport, BlockedRollback, MigrationState, MigrationStep, RollbackReport, StatusEntry,
};
pub use runner::MigrationRunner;
