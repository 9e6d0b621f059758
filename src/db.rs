//! SQLite connection handling.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::time::Duration;

use crate::config::Config;

/// Open the studio database pool.
///
/// WAL keeps reads from the front-desk UI responsive while a CLI command
/// writes, and the busy timeout rides out the brief overlap when both hold
/// the write lock. `kiln init` creates the data directory; a missing
/// database file here is recreated, a missing directory is an error.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(&config.db.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database: {}", config.db.path.display()))?;

    Ok(pool)
}
