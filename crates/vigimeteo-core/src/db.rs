//! `SQLite` plumbing for the portal store.
//!
//! The server crate owns the schema (`migrations/`) and its queries; this
//! module only opens pools and stamps out the database handle type.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Concurrent writers wait this long for the file lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Request handlers, the poll loop and the purge job share the file pool.
const FILE_POOL_SIZE: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    /// Lookup by key matched no row.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        Self::Query(e.to_string())
    }
}

fn connect_options(url: &str) -> Result<SqliteConnectOptions, DatabaseError> {
    Ok(SqliteConnectOptions::from_str(url)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true))
}

/// Portal database file at `path`, created with its directory if missing.
pub async fn open_pool(path: &Path) -> Result<Pool<Sqlite>, DatabaseError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io(e.to_string()))?;
    }

    let options =
        connect_options(&format!("sqlite:{}?mode=rwc", path.display()))?.busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new()
        .max_connections(FILE_POOL_SIZE)
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;

    info!(path = %path.display(), "Portal database opened");
    Ok(pool)
}

/// Throwaway in-memory store used by tests.
pub async fn open_pool_in_memory() -> Result<Pool<Sqlite>, DatabaseError> {
    // Each new :memory: connection is a fresh empty database, so keep exactly one alive.
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect_options("sqlite::memory:")?)
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))
}

/// Declares a cloneable database handle wrapping a migrated pool.
///
/// ```ignore
/// vigimeteo_core::define_database!(PortalDatabase, "Portal database migrations complete");
/// ```
///
/// Query methods are added with further `impl` blocks next to the schema.
#[macro_export]
macro_rules! define_database {
    ($name:ident, $migrated_msg:expr) => {
        #[derive(Clone)]
        pub struct $name {
            pool: ::sqlx::Pool<::sqlx::Sqlite>,
        }

        impl $name {
            pub async fn open(
                path: &::std::path::Path,
            ) -> ::std::result::Result<Self, $crate::db::DatabaseError> {
                Self::migrated($crate::db::open_pool(path).await?).await
            }

            pub async fn open_in_memory() -> ::std::result::Result<Self, $crate::db::DatabaseError>
            {
                Self::migrated($crate::db::open_pool_in_memory().await?).await
            }

            async fn migrated(
                pool: ::sqlx::Pool<::sqlx::Sqlite>,
            ) -> ::std::result::Result<Self, $crate::db::DatabaseError> {
                ::sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .map_err(|e| $crate::db::DatabaseError::Migration(e.to_string()))?;
                ::tracing::info!($migrated_msg);
                Ok(Self { pool })
            }

            pub const fn pool(&self) -> &::sqlx::Pool<::sqlx::Sqlite> {
                &self.pool
            }
        }
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_pool_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("portal.db");
        let pool = open_pool(&path).await.unwrap();

        let (one,): (i64,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(one, 1);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn memory_pool_keeps_tables_between_queries() {
        let pool = open_pool_in_memory().await.unwrap();
        sqlx::query("CREATE TABLE scratch (x INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO scratch (x) VALUES (7)")
            .execute(&pool)
            .await
            .unwrap();

        let (x,): (i64,) = sqlx::query_as("SELECT x FROM scratch")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(x, 7);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let pool = open_pool_in_memory().await.unwrap();
        sqlx::query("CREATE TABLE parent (id INTEGER PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE child (parent_id INTEGER REFERENCES parent(id))")
            .execute(&pool)
            .await
            .unwrap();

        let orphan = sqlx::query("INSERT INTO child (parent_id) VALUES (42)")
            .execute(&pool)
            .await;
        assert!(orphan.is_err());
    }
}
