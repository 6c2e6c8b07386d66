//! Ingestion coordinator.
//!
//! Owns the read loop: frames lines from the input stream, parses each one in
//! arrival order, and hands accepted records to the [`Dispatcher`]. The loop
//! never waits on an insert to finish; it only pauses when the in-flight limit
//! is reached.
//!
//! # States
//!
//! ```text
//!   run() ──► Running ──► Stopped
//!                │
//!                ├─ input stream closed           (Ok)
//!                ├─ shutdown future resolved      (Ok)
//!                ├─ input stream error            (Err, fatal)
//!                └─ insert failed, Abort policy   (Err, fatal)
//! ```
//!
//! Every exit path drains in-flight persistence tasks for at most the
//! configured drain timeout before reporting `Stopped`.

use std::future::Future;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::watch;
use tracing::{error, info, trace, warn};

use crate::config::{DispatchSettings, FailurePolicy};
use crate::dispatch::Dispatcher;
use crate::error::{AppResult, IngestError};
use crate::framer::{LineFramer, DEFAULT_MAX_LINE_LEN};
use crate::record::{self, RunLabel};
use crate::sink::ReadingSink;

/// Lifecycle of the read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Reading and dispatching lines
    Running,
    /// Not reading; either not started yet or finished
    Stopped,
}

/// Counters describing one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Lines produced by the framer
    pub lines: u64,
    /// Lines dropped for having the wrong shape
    pub rejected: u64,
    /// Records handed to the sink
    pub dispatched: u64,
    /// Records the sink accepted
    pub persisted: u64,
    /// Records the sink rejected
    pub failed: u64,
    /// Records still in flight when the drain deadline passed
    pub abandoned: u64,
}

/// Drives framer → parser → sink for the lifetime of the process.
pub struct Coordinator<S> {
    sink: Arc<S>,
    label: RunLabel,
    settings: DispatchSettings,
    max_line_len: usize,
    state: watch::Sender<CoordinatorState>,
}

impl<S: ReadingSink> Coordinator<S> {
    /// Create a coordinator writing to `sink`, tagging rows with `label`.
    pub fn new(sink: Arc<S>, label: RunLabel, settings: DispatchSettings) -> Self {
        let (state, _) = watch::channel(CoordinatorState::Stopped);
        Self {
            sink,
            label,
            settings,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            state,
        }
    }

    /// Override the framer's line length limit.
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// Current state.
    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    /// Ingest from `reader` until it closes, fails, or `shutdown` resolves.
    ///
    /// The caller is expected to have verified storage connectivity first;
    /// `run` enters `Running` immediately.
    pub async fn run<R, F>(&self, reader: R, shutdown: F) -> AppResult<RunSummary>
    where
        R: AsyncRead + Unpin,
        F: Future<Output = ()>,
    {
        let mut framer = LineFramer::with_max_line_len(reader, self.max_line_len);
        let mut dispatcher = Dispatcher::new(Arc::clone(&self.sink), self.settings.max_in_flight);
        let abort_on_failure = self.settings.failure_policy == FailurePolicy::Abort;
        let mut rejected = 0u64;
        tokio::pin!(shutdown);

        self.state.send_replace(CoordinatorState::Running);
        info!(
            label = %self.label,
            max_in_flight = self.settings.max_in_flight,
            policy = ?self.settings.failure_policy,
            "ingestion running"
        );

        let outcome: AppResult<()> = loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("shutdown requested");
                    break Ok(());
                }

                Some(err) = dispatcher.next_failure(), if abort_on_failure => {
                    break Err(IngestError::Persist(err));
                }

                line = framer.next_line() => match line {
                    Ok(Some(line)) => {
                        let Some(record) = record::parse(&line) else {
                            rejected += 1;
                            trace!(line = %line, "dropping malformed line");
                            continue;
                        };
                        if let Err(err) = dispatcher.dispatch(record, self.label.clone()).await {
                            break Err(err);
                        }
                        if let Some(err) = dispatcher.reap() {
                            if abort_on_failure {
                                break Err(IngestError::Persist(err));
                            }
                        }
                    }
                    Ok(None) => {
                        info!("input stream closed");
                        break Ok(());
                    }
                    Err(err) => {
                        error!(error = %err, "input stream failed");
                        break Err(err);
                    }
                },
            }
        };

        let report = dispatcher.drain(self.settings.drain_timeout()).await;
        self.state.send_replace(CoordinatorState::Stopped);

        let stats = dispatcher.stats();
        let summary = RunSummary {
            lines: framer.lines_read(),
            rejected,
            dispatched: stats.dispatched,
            persisted: stats.persisted,
            failed: stats.failed,
            abandoned: stats.abandoned,
        };
        info!(
            lines = summary.lines,
            rejected = summary.rejected,
            persisted = summary.persisted,
            failed = summary.failed,
            abandoned = summary.abandoned,
            "ingestion stopped"
        );

        match (outcome, report.first_failure) {
            (Err(err), _) => Err(err),
            (Ok(()), Some(err)) if abort_on_failure => {
                warn!("insert failed while draining");
                Err(IngestError::Persist(err))
            }
            (Ok(()), _) => Ok(summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::record::Record;
    use async_trait::async_trait;
    use std::sync::{Mutex, OnceLock};
    use tokio_test::io::Builder;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct VecSink {
        rows: Mutex<Vec<(Record, RunLabel)>>,
    }

    #[async_trait]
    impl ReadingSink for VecSink {
        async fn ping(&self) -> Result<(), StorageError> {
            Ok(())
        }

        async fn persist(&self, record: &Record, label: &RunLabel) -> Result<(), StorageError> {
            self.rows.lock().unwrap().push((record.clone(), label.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn persists_well_formed_lines_with_label() {
        let sink = Arc::new(VecSink::default());
        let coordinator =
            Coordinator::new(Arc::clone(&sink), "partA".into(), DispatchSettings::default());
        let reader = Builder::new()
            .read(b"12:00:01,1.5,2.5,3.5\r\nbad,data\r\n")
            .build();

        let summary = coordinator
            .run(reader, std::future::pending())
            .await
            .unwrap();

        assert_eq!(summary.lines, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.persisted, 1);
        let rows = sink.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.z, "3.5");
        assert_eq!(rows[0].1.as_str(), "partA");
    }

    /// Records the coordinator state seen by each insert.
    #[derive(Default)]
    struct StateSink {
        states: OnceLock<watch::Receiver<CoordinatorState>>,
        seen: Mutex<Vec<CoordinatorState>>,
    }

    #[async_trait]
    impl ReadingSink for StateSink {
        async fn ping(&self) -> Result<(), StorageError> {
            Ok(())
        }

        async fn persist(&self, _record: &Record, _label: &RunLabel) -> Result<(), StorageError> {
            let state = *self.states.get().unwrap().borrow();
            self.seen.lock().unwrap().push(state);
            Ok(())
        }
    }

    #[tokio::test]
    async fn reports_state_transitions() {
        let sink = Arc::new(StateSink::default());
        let coordinator =
            Coordinator::new(Arc::clone(&sink), RunLabel::default(), DispatchSettings::default());
        sink.states.set(coordinator.subscribe_state()).unwrap();
        let mut states = coordinator.subscribe_state();
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);

        let reader = Builder::new().read(b"1,2,3,4\n5,6,7,8\n").build();
        coordinator
            .run(reader, std::future::pending())
            .await
            .unwrap();

        assert_eq!(
            *sink.seen.lock().unwrap(),
            vec![CoordinatorState::Running, CoordinatorState::Running]
        );
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), CoordinatorState::Stopped);
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
    }

    #[tokio::test]
    async fn shutdown_stops_an_idle_stream() {
        let sink = Arc::new(VecSink::default());
        let coordinator = Coordinator::new(sink, RunLabel::default(), DispatchSettings::default());
        let (_writer, reader) = tokio::io::duplex(64);

        let summary = coordinator.run(reader, async {}).await.unwrap();
        assert_eq!(summary, RunSummary::default());
    }

    #[tokio::test]
    #[traced_test]
    async fn logs_dropped_lines() {
        let sink = Arc::new(VecSink::default());
        let coordinator = Coordinator::new(sink, RunLabel::default(), DispatchSettings::default());
        let reader = Builder::new().read(b"only,three,fields\n").build();

        let summary = coordinator
            .run(reader, std::future::pending())
            .await
            .unwrap();

        assert_eq!(summary.rejected, 1);
        assert!(logs_contain("dropping malformed line"));
        assert!(logs_contain("ingestion stopped"));
    }
}
