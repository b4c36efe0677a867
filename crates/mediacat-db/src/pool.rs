//! Database connection pool management.
//!
//! Connection pooling for SQLite using r2d2. Every connection gets the same
//! busy timeout so concurrent readers wait on the storage engine's own lock
//! instead of failing immediately.

use std::time::Duration;

use mediacat_common::{Error, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::migrations;

/// Type alias for the database connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled database connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Lock wait applied when no explicit timeout is configured.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const POOL_SIZE: u32 = 4;

/// Open (or create) the store at `db_path` and run pending migrations.
///
/// # Example
///
/// ```no_run
/// use mediacat_db::pool::{init_pool, DEFAULT_BUSY_TIMEOUT};
///
/// let pool = init_pool("/var/lib/mediacat/catalog.sqlite", DEFAULT_BUSY_TIMEOUT).unwrap();
/// let conn = pool.get().unwrap();
/// ```
pub fn init_pool(db_path: &str, busy_timeout: Duration) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    build(manager, POOL_SIZE)
}

/// Initialize an in-memory database pool for testing.
///
/// Every in-memory connection is a separate database, so the pool holds a
/// single connection.
///
/// ```
/// use mediacat_db::pool::init_memory_pool;
///
/// let pool = init_memory_pool().unwrap();
/// let conn = pool.get().unwrap();
/// ```
pub fn init_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory().with_init(|conn| {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    build(manager, 1)
}

fn build(manager: SqliteConnectionManager, max_size: u32) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(Error::backend)?;

    let conn = get_conn(&pool)?;
    let applied = migrations::run_migrations(&conn).map_err(Error::backend)?;
    if applied > 0 {
        tracing::debug!("Applied {} catalog migration(s)", applied);
    }

    Ok(pool)
}

/// Get a connection from the pool.
///
/// Pool exhaustion or a failed open surfaces as
/// [`Error::BackendUnavailable`].
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get().map_err(Error::backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_memory_pool() {
        let pool = init_memory_pool().unwrap();
        assert_eq!(pool.max_size(), 1);
    }

    #[test]
    fn test_get_conn_enables_foreign_keys() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_migrations_run_on_init() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('objects', 'details')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_file_pool_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.sqlite");
        let path = path.to_str().unwrap();

        {
            let pool = init_pool(path, DEFAULT_BUSY_TIMEOUT).unwrap();
            assert_eq!(pool.max_size(), POOL_SIZE);
            let conn = get_conn(&pool).unwrap();
            conn.execute(
                "INSERT INTO details (title) VALUES (?)",
                rusqlite::params!["kept"],
            )
            .unwrap();
        }

        let pool = init_pool(path, DEFAULT_BUSY_TIMEOUT).unwrap();
        let conn = get_conn(&pool).unwrap();
        let title: String = conn
            .query_row("SELECT title FROM details", [], |row| row.get(0))
            .unwrap();
        assert_eq!(title, "kept");
    }
}
