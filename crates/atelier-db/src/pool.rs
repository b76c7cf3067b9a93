use std::path::Path;
use std::sync::Once;
use std::time::Duration;

use atelier_common::{Error, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use sqlite_vec::sqlite3_vec_init;
use tracing::info;

use crate::migrations;

/// Pool sizing knobs. Deployment configuration, not application logic.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

pub type DbConnection = PooledConnection<SqliteConnectionManager>;

static VEC_EXTENSION: Once = Once::new();

/// Register sqlite-vec so every subsequently opened connection has the
/// vector distance functions available.
fn register_vector_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Handle to the pooled SQLite database. Constructed once by the host
/// process and passed to each store; cloning shares the pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn open(db_path: &Path, options: PoolOptions) -> Result<Self> {
        register_vector_extension();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("opening database at {}", db_path.display());
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA foreign_keys=ON;
                 PRAGMA busy_timeout=5000;",
            )
        });

        Self::build(manager, options)
    }

    /// In-memory database for tests. Capped at one connection so every
    /// checkout sees the same data.
    pub fn in_memory() -> Result<Self> {
        register_vector_extension();

        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys=ON;"));

        Self::build(
            manager,
            PoolOptions {
                max_connections: 1,
                ..PoolOptions::default()
            },
        )
    }

    fn build(manager: SqliteConnectionManager, options: PoolOptions) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(options.max_connections)
            .connection_timeout(options.acquire_timeout)
            .build(manager)
            .map_err(|e| Error::Database(format!("failed to build connection pool: {e}")))?;

        let db = Self { pool };
        migrations::apply(&*db.conn()?)?;
        Ok(db)
    }

    /// Acquire a pooled connection. A transaction begun on the returned
    /// guard stays on that one connection until the guard drops.
    pub fn conn(&self) -> Result<DbConnection> {
        self.pool
            .get()
            .map_err(|e| Error::Database(format!("failed to acquire connection: {e}")))
    }

    /// Shutdown hook for the host process. The pool itself closes when
    /// the last handle drops.
    pub fn shutdown(&self) {
        let state = self.pool.state();
        info!(
            "database pool shutting down ({} connections, {} idle)",
            state.connections, state.idle_connections
        );
    }
}
