//! Error types for the ingestion bridge.
//!
//! Two enums cover every failure the pipeline can observe:
//!
//! - **`IngestError`**: everything that ends (or prevents) a run. Configuration
//!   and connection problems are raised before the coordinator starts; stream
//!   errors and over-long lines end the read loop; `Persist` is only produced
//!   when the abort-on-failure policy is selected.
//! - **`StorageError`**: failures reported by a [`ReadingSink`](crate::sink::ReadingSink).
//!   Under the default isolate policy these stay inside the persistence task
//!   that produced them and are only logged and counted.
//!
//! Malformed lines are not errors at all; the parser returns `None` and the
//! coordinator moves on.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Failed to open serial port '{port}': {source}")]
    SerialOpen {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("Input stream error: {0}")]
    Stream(#[source] std::io::Error),

    #[error("Input line longer than {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Persistence failed, stopping ingestion: {0}")]
    Persist(#[source] StorageError),

    #[error("Persistence dispatcher is closed")]
    DispatchClosed,
}

/// Failures reported by the persistence sink.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("database ping failed: {0}")]
    Ping(#[source] sqlx::Error),

    #[error("insert failed: {0}")]
    Insert(#[source] sqlx::Error),

    #[error("invalid table name '{0}'")]
    InvalidTable(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("persistence task aborted: {0}")]
    Task(String),
}

impl IngestError {
    /// Whether this error belongs to the input side of the pipeline.
    pub fn is_stream_error(&self) -> bool {
        matches!(self, IngestError::Stream(_) | IngestError::LineTooLong { .. })
    }
}
