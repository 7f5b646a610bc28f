// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use drover_core::error::{AppError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 10;

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Connect options with WAL mode and a busy timeout
pub(crate) fn connect_options(database_url: &str) -> Result<SqliteConnectOptions> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| AppError::Config(format!("invalid database url '{database_url}': {e}")))?
        .busy_timeout(BUSY_TIMEOUT)
        .create_if_missing(true);

    // WAL is meaningless for in-memory databases
    Ok(if is_in_memory(database_url) {
        options
    } else {
        options.journal_mode(SqliteJournalMode::Wal)
    })
}

/// Pool options; an in-memory database lives in exactly one pinned connection
pub(crate) fn pool_options(database_url: &str) -> SqlitePoolOptions {
    if is_in_memory(database_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
    }
}

/// Create SQLite connection pool (connects eagerly, so a bad path fails here)
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    pool_options(database_url)
        .connect_with(connect_options(database_url)?)
        .await
        .map_err(map_sqlx_error)
}

/// Create a pool that connects on first use
pub(crate) fn create_lazy_pool(database_url: &str) -> Result<SqlitePool> {
    Ok(pool_options(database_url).connect_lazy_with(connect_options(database_url)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_pool() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        assert!(pool.acquire().await.is_ok());
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let err = connect_options("sqlite://drover-test.db?mode=bogus").unwrap_err();
        assert!(err.is_configuration());
    }
}
