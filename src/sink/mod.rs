//! Persistence sinks.
//!
//! A [`ReadingSink`] writes one [`Record`] tagged with the run label to
//! durable storage. Implementations must be safe for concurrent use without
//! external locking: the coordinator shares a single sink across every
//! in-flight persistence task.
//!
//! - [`PostgresSink`]: pooled PostgreSQL connection writing to `readings`

pub mod postgres;

pub use postgres::PostgresSink;

use crate::error::StorageError;
use crate::record::{Record, RunLabel};
use async_trait::async_trait;

/// Write path to durable storage.
///
/// Each call to [`persist`](Self::persist) is a single, independent attempt:
/// no batching, retry, or deduplication.
#[async_trait]
pub trait ReadingSink: Send + Sync + 'static {
    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Persist one record tagged with `label`.
    async fn persist(&self, record: &Record, label: &RunLabel) -> Result<(), StorageError>;
}
