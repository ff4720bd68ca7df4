// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use conveyor_core::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Create SQLite connection pool with WAL mode
///
/// Accepts a `sqlite:` URL or a plain file path. In-memory databases are
/// per-connection, so they get a single connection that is never recycled.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:");

    let options = if database_url.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(database_url).map_err(map_sqlx_error)?
    } else {
        SqliteConnectOptions::new().filename(database_url)
    };
    let options = options
        .journal_mode(if in_memory {
            SqliteJournalMode::Memory
        } else {
            SqliteJournalMode::Wal
        })
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(10)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)?;

    info!(database_url = %database_url, "SQLite pool ready");
    Ok(pool)
}
