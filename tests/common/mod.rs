//! Shared fake sink for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sensor_ingest::{Record, ReadingSink, RunLabel, StorageError, StoredReading};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory store that records every row it accepts.
#[derive(Default)]
pub struct MemorySink {
    rows: Mutex<Vec<StoredReading>>,
    /// Inserts whose `x` equals this value fail.
    fail_on_x: Option<String>,
    /// Delay applied to every insert.
    delay: Option<Duration>,
    /// Inserts never complete.
    hang: bool,
    attempts: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(x: &str) -> Self {
        Self {
            fail_on_x: Some(x.to_string()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<StoredReading> {
        self.rows.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadingSink for MemorySink {
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn persist(&self, record: &Record, label: &RunLabel) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_x.as_deref() == Some(record.x.as_str()) {
            return Err(StorageError::Unavailable(format!(
                "rejected reading at {}",
                record.timestamp
            )));
        }
        self.rows
            .lock()
            .unwrap()
            .push(StoredReading::new(record, label));
        Ok(())
    }
}

/// `count` well-formed lines, newline terminated.
pub fn sensor_lines(count: usize) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..count {
        out.push_str(&format!("{},{}.0,{}.5,-{}.25\r\n", i, i, i, i));
    }
    out.into_bytes()
}
