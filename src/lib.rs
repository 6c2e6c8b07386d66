//! # Sensor Ingest Library
//!
//! Continuous ingestion bridge from a serial accelerometer to PostgreSQL. The
//! device writes one reading per line (`timestamp,x,y,z`); every valid line
//! becomes one row of `readings(x, y, z, time, print)`, tagged with the label
//! of the job currently running.
//!
//! ## Crate Structure
//!
//! - **`framer`**: splits an async byte stream into newline-delimited lines.
//! - **`record`**: the `Record` parser, `RunLabel`, and the stored row shape.
//! - **`sink`**: the `ReadingSink` trait and its PostgreSQL implementation.
//! - **`dispatch`**: bounded, tracked spawning of persistence tasks.
//! - **`coordinator`**: the read loop and its `Running`/`Stopped` state.
//! - **`serial`**: opens the serial device as an `AsyncRead` stream.
//! - **`config`**: layered Figment configuration and validation.
//! - **`logging`**: tracing subscriber initialisation.
//! - **`error`**: `IngestError` and `StorageError`.
//!
//! ## Data Flow
//!
//! ```text
//! serial ─► LineFramer ─► record::parse ─► Dispatcher ─► ReadingSink
//!                              │ (None)
//!                              └─► dropped
//! ```

pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod framer;
pub mod logging;
pub mod record;
pub mod serial;
pub mod sink;

pub use coordinator::{Coordinator, CoordinatorState, RunSummary};
pub use error::{AppResult, IngestError, StorageError};
pub use record::{Record, RunLabel, StoredReading};
pub use sink::ReadingSink;
