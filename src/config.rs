//! Configuration loading using Figment.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. A settings file (`settings.toml` by default; `.json` files are read as JSON)
//! 3. Environment variables prefixed with `SENSOR_INGEST_`, sections separated
//!    by a double underscore (e.g. `SENSOR_INGEST_DATABASE__HOST=db.local`)
//!
//! A missing settings file is not an error; defaults and the environment still
//! apply.
//!
//! # Example
//! ```no_run
//! use sensor_ingest::config::IngestConfig;
//!
//! # fn main() -> sensor_ingest::error::AppResult<()> {
//! let config = IngestConfig::load_from("settings.toml")?;
//! config.validate()?;
//! println!("Reading from {}", config.serial.port);
//! # Ok(())
//! # }
//! ```

use crate::error::{AppResult, IngestError};
use crate::framer::DEFAULT_MAX_LINE_LEN;
use crate::sink::postgres::is_sql_identifier;
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default settings file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "settings.toml";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "SENSOR_INGEST_";

/// Largest accepted `dispatch.max_in_flight`.
pub const MAX_IN_FLIGHT_LIMIT: usize = 10_000;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Logging settings
    pub application: ApplicationSettings,
    /// Serial device settings
    pub serial: SerialSettings,
    /// Database connection settings
    pub database: DatabaseSettings,
    /// Persistence dispatch settings
    pub dispatch: DispatchSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output with colors
    Pretty,
    /// Single-line output without colors
    Compact,
    /// Newline-delimited JSON for log aggregation
    Json,
}

/// Serial device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Communication speed
    pub baud_rate: u32,
    /// Longest accepted line in bytes
    pub max_line_len: usize,
}

/// Connection settings for the reading store.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    #[serde(rename = "dbName", alias = "db_name", alias = "dbname")]
    pub db_name: String,
    /// Table receiving readings
    pub table: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
    /// How long a persistence task waits for a pooled connection
    pub acquire_timeout_ms: u64,
}

/// What happens when a single insert fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log and count the failure; keep ingesting.
    Isolate,
    /// Stop ingesting at the first failure.
    Abort,
}

/// Persistence dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Maximum persistence tasks in flight at once
    pub max_in_flight: usize,
    /// How long to wait for in-flight tasks when the run ends
    pub drain_timeout_ms: u64,
    /// Reaction to a failed insert
    pub failure_policy: FailurePolicy,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: default_serial_port().to_string(),
            baud_rate: 115_200,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            db_name: "postgres".to_string(),
            table: "readings".to_string(),
            max_connections: 10,
            acquire_timeout_ms: 5000,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            drain_timeout_ms: 5000,
            failure_policy: FailurePolicy::Isolate,
        }
    }
}

fn default_serial_port() -> &'static str {
    if cfg!(windows) {
        "COM3"
    } else {
        "/dev/ttyUSB0"
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("db_name", &self.db_name)
            .field("table", &self.table)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .finish()
    }
}

impl DatabaseSettings {
    /// Pool acquire timeout as a [`Duration`].
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl DispatchSettings {
    /// Drain timeout as a [`Duration`].
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl IngestConfig {
    /// Load configuration from the default settings file and environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path and the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::from_figment(Self::figment(path))
    }

    /// Build the layered [`Figment`] without extracting it, so callers can
    /// merge further overrides (e.g. command-line flags) on top.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let figment = Figment::new();
        let figment = if is_json {
            figment.merge(Json::file(path))
        } else {
            figment.merge(Toml::file(path))
        };
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract configuration from a prepared [`Figment`].
    pub fn from_figment(figment: Figment) -> AppResult<Self> {
        Ok(figment.extract()?)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.serial.port.trim().is_empty() {
            return Err(invalid("serial.port must not be empty"));
        }
        if self.serial.baud_rate == 0 {
            return Err(invalid("serial.baud_rate must be greater than 0"));
        }
        if self.serial.max_line_len == 0 {
            return Err(invalid("serial.max_line_len must be greater than 0"));
        }

        if self.database.host.trim().is_empty() {
            return Err(invalid("database.host must not be empty"));
        }
        if !is_sql_identifier(&self.database.table) {
            return Err(invalid(format!(
                "database.table '{}' is not a valid table name",
                self.database.table
            )));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections must be greater than 0"));
        }

        if !(1..=MAX_IN_FLIGHT_LIMIT).contains(&self.dispatch.max_in_flight) {
            return Err(invalid(format!(
                "dispatch.max_in_flight must be between 1 and {}",
                MAX_IN_FLIGHT_LIMIT
            )));
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> IngestError {
    IngestError::Configuration(msg.into())
}
