//! # Database
//!
//! Opens the SQLite pool and applies the embedded migrations.

use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, info, instrument};

pub static MIGRATOR: LazyLock<Migrator> = LazyLock::new(|| sqlx::migrate!("./migrations"));

const DB_MAX_CONNECTIONS: u32 = 5;
const DB_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connects to `database_url`, creating the file if needed, and migrates.
#[instrument]
pub async fn connect(database_url: &str) -> Result<SqlitePool, DatabaseError> {
    let opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(DB_BUSY_TIMEOUT);

    debug!("Creating connection pool");
    let pool = SqlitePoolOptions::new()
        .max_connections(DB_MAX_CONNECTIONS)
        .connect_with(opts)
        .await?;

    MIGRATOR.run(&pool).await?;
    info!("Database ready");
    Ok(pool)
}
