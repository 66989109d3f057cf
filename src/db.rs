//! SQLite database connection management.
//!
//! The corpus database is produced by a separate ingestion process; Code
//! Harness only reads it. Connections are opened read-only, so a missing
//! file is an error rather than being created empty.
//!
//! # Connection Pool
//!
//! Uses `sqlx::SqlitePool` with up to 5 concurrent connections, shared by
//! every query the process runs.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::config::Config;

/// Open a read-only connection pool to the configured corpus database.
///
/// # Errors
///
/// Returns an error if the database file does not exist or cannot be opened.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    connect_path(&config.db.path).await
}

/// Open a read-only connection pool to the database at `db_path`.
pub async fn connect_path(db_path: &Path) -> Result<SqlitePool> {
    if !db_path.exists() {
        anyhow::bail!("Corpus database not found: {}", db_path.display());
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true)
        .create_if_missing(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open corpus database: {}", db_path.display()))?;

    Ok(pool)
}
