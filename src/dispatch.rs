//! Bounded, tracked dispatch of persistence tasks.
//!
//! Every accepted record is persisted by its own Tokio task. The
//! [`Dispatcher`] keeps those tasks in a [`JoinSet`] so they can be drained
//! before exit, and caps how many run at once with a [`Semaphore`]:
//!
//! ```text
//! reader ──dispatch()──► [permit] ──spawn──► sink.persist()
//!    ▲                                             │
//!    └── waits only when max_in_flight reached ◄───┘ (permit released)
//! ```
//!
//! Tasks are isolated from each other. A failed insert or a panicking task
//! is logged and counted; it never reaches sibling tasks or the read loop.
//! Whether a failure stops ingestion is decided by the caller, which sees
//! failures through [`Dispatcher::reap`] and [`Dispatcher::next_failure`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

use crate::error::{AppResult, IngestError, StorageError};
use crate::record::{Record, RunLabel};
use crate::sink::ReadingSink;

/// Counters for one dispatcher's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Tasks spawned
    pub dispatched: u64,
    /// Tasks whose insert succeeded
    pub persisted: u64,
    /// Tasks whose insert failed or whose task panicked
    pub failed: u64,
    /// Tasks still running when the drain deadline passed
    pub abandoned: u64,
}

/// Result of [`Dispatcher::drain`].
#[derive(Debug, Default)]
pub struct DrainReport {
    /// First failure observed while draining, if any
    pub first_failure: Option<StorageError>,
    /// Tasks aborted because they outlived the deadline
    pub abandoned: u64,
}

/// Owns in-flight persistence tasks for one ingestion run.
pub struct Dispatcher<S> {
    sink: Arc<S>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<Result<(), StorageError>>,
    stats: DispatchStats,
}

impl<S: ReadingSink> Dispatcher<S> {
    /// Create a dispatcher allowing at most `max_in_flight` concurrent tasks.
    pub fn new(sink: Arc<S>, max_in_flight: usize) -> Self {
        Self {
            sink,
            permits: Arc::new(Semaphore::new(max_in_flight.clamp(1, Semaphore::MAX_PERMITS))),
            tasks: JoinSet::new(),
            stats: DispatchStats::default(),
        }
    }

    /// Persist `record` on a new task.
    ///
    /// Returns once the task is spawned; waits beforehand only if the
    /// in-flight limit has been reached. Fails with
    /// [`IngestError::DispatchClosed`] once [`drain`](Self::drain) has run.
    pub async fn dispatch(&mut self, record: Record, label: RunLabel) -> AppResult<()> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| IngestError::DispatchClosed)?;
        let sink = Arc::clone(&self.sink);

        self.tasks.spawn(async move {
            let _permit = permit;
            let result = sink.persist(&record, &label).await;
            if let Err(err) = &result {
                error!(
                    error = %err,
                    time = %record.timestamp,
                    label = %label,
                    "failed to persist reading"
                );
            }
            result
        });
        self.stats.dispatched += 1;
        Ok(())
    }

    /// Collect every finished task without waiting.
    ///
    /// Returns the first failure among them.
    pub fn reap(&mut self) -> Option<StorageError> {
        let mut first = None;
        while let Some(joined) = self.tasks.try_join_next() {
            if let Some(err) = self.settle(joined) {
                first.get_or_insert(err);
            }
        }
        first
    }

    /// Wait until a task fails.
    ///
    /// Successful tasks are settled along the way. Resolves to `None` once no
    /// tasks remain. Cancel-safe.
    pub async fn next_failure(&mut self) -> Option<StorageError> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Some(err) = self.settle(joined) {
                return Some(err);
            }
        }
        None
    }

    /// Wait up to `timeout` for in-flight tasks, then abort the rest.
    ///
    /// No new tasks are accepted afterwards.
    pub async fn drain(&mut self, timeout: Duration) -> DrainReport {
        self.permits.close();
        let mut report = DrainReport::default();
        if self.tasks.is_empty() {
            return report;
        }
        debug!(outstanding = self.tasks.len(), "draining persistence tasks");

        let finished = tokio::time::timeout(timeout, async {
            while let Some(joined) = self.tasks.join_next().await {
                if let Some(err) = self.settle(joined) {
                    report.first_failure.get_or_insert(err);
                }
            }
        })
        .await;

        if finished.is_err() {
            report.abandoned = self.tasks.len() as u64;
            warn!(
                abandoned = report.abandoned,
                timeout_ms = timeout.as_millis() as u64,
                "persistence tasks still running at drain deadline; aborting"
            );
            self.tasks.shutdown().await;
            self.stats.abandoned += report.abandoned;
        }
        report
    }

    /// Number of tasks not yet settled.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Counters so far.
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    fn settle(&mut self, joined: Result<Result<(), StorageError>, JoinError>) -> Option<StorageError> {
        match joined {
            Ok(Ok(())) => {
                self.stats.persisted += 1;
                None
            }
            Ok(Err(err)) => {
                self.stats.failed += 1;
                Some(err)
            }
            Err(join_err) if join_err.is_cancelled() => None,
            Err(join_err) => {
                self.stats.failed += 1;
                error!(error = %join_err, "persistence task panicked");
                Some(StorageError::Task(join_err.to_string()))
            }
        }
    }
}
