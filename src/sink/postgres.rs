//! PostgreSQL reading sink.
//!
//! Each persisted record becomes one parameterised insert:
//!
//! ```sql
//! INSERT INTO readings (x, y, z, time, print) VALUES ($1, $2, $3, $4, $5)
//! ```
//!
//! All values are bound as text. Columns should be text, or the database must
//! be able to coerce the bound values itself.
//!
//! The sink owns a [`PgPool`]; cloning the pool handle is how concurrent
//! persistence tasks share connections.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::Connection;
use tracing::{debug, info};

use super::ReadingSink;
use crate::config::DatabaseSettings;
use crate::error::StorageError;
use crate::record::{Record, RunLabel, StoredReading};

/// Pooled PostgreSQL writer for the readings table.
pub struct PostgresSink {
    pool: PgPool,
    insert_sql: String,
}

impl PostgresSink {
    /// Connect to the database described by `settings`.
    ///
    /// The pool eagerly opens one connection, so an unreachable server fails
    /// here rather than on the first insert.
    pub async fn open(settings: &DatabaseSettings) -> Result<Self, StorageError> {
        let insert_sql = Self::insert_statement(&settings.table)?;
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.db_name)
            .ssl_mode(PgSslMode::Disable);

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout())
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        info!(
            host = %settings.host,
            port = settings.port,
            database = %settings.db_name,
            table = %settings.table,
            max_connections = settings.max_connections,
            "connected to reading store"
        );

        Ok(Self { pool, insert_sql })
    }

    /// Wrap an existing pool, inserting into `table`.
    pub fn with_pool(pool: PgPool, table: &str) -> Result<Self, StorageError> {
        Ok(Self {
            pool,
            insert_sql: Self::insert_statement(table)?,
        })
    }

    /// Build the insert statement for `table`.
    ///
    /// The table name is interpolated, so it must pass [`is_sql_identifier`].
    pub fn insert_statement(table: &str) -> Result<String, StorageError> {
        if !is_sql_identifier(table) {
            return Err(StorageError::InvalidTable(table.to_string()));
        }
        Ok(format!(
            "INSERT INTO {} (x, y, z, time, print) VALUES ($1, $2, $3, $4, $5)",
            table
        ))
    }

    /// Close every pooled connection, waiting for checked-out ones to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Accepts `name` or `schema.name` made of ASCII letters, digits and `_`.
pub fn is_sql_identifier(name: &str) -> bool {
    let part_ok = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let mut parts = name.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(table), None, None) => part_ok(table),
        (Some(schema), Some(table), None) => part_ok(schema) && part_ok(table),
        _ => false,
    }
}

#[async_trait]
impl ReadingSink for PostgresSink {
    async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::Ping)?;
        conn.ping().await.map_err(StorageError::Ping)
    }

    async fn persist(&self, record: &Record, label: &RunLabel) -> Result<(), StorageError> {
        let row = StoredReading::new(record, label);

        sqlx::query(&self.insert_sql)
            .bind(&row.x)
            .bind(&row.y)
            .bind(&row.z)
            .bind(&row.time)
            .bind(&row.print_label)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Insert)?;

        debug!(time = %row.time, "reading persisted");
        Ok(())
    }
}
