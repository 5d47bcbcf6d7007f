//! TRELLIS Storage - Execution Backends, Sessions and Query Sets
//!
//! Defines the execution backend abstraction (blocking and suspending) and
//! everything that executes through it: query sets, batches, instance
//! persistence, and schema synchronization. The wire-protocol client is an
//! implementation of [`Backend`] or [`AsyncBackend`] supplied by the caller.

pub mod async_backend;
pub mod async_batch;
pub mod async_queryset;
pub mod async_session;
pub mod backend;
pub mod batch;
pub mod lazy;
pub mod mock;
pub mod plan;
pub mod queryset;
pub mod session;
pub mod sync;

#[cfg(test)]
mod fixtures;

pub use async_backend::AsyncBackend;
pub use async_batch::AsyncBatch;
pub use async_queryset::AsyncQuerySet;
pub use async_session::AsyncSession;
pub use backend::{Backend, ExecOptions};
pub use batch::Batch;
pub use lazy::{AsyncLazyBackend, LazyBackend};
pub use mock::MockBackend;
pub use queryset::QuerySet;
pub use session::Session;
pub use sync::{plan_sync, LiveTable, SyncOptions};
