//! SQLite persistence for jobs and their uploaded sources.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Transaction};

pub mod error;
pub mod job_repo;
pub mod migrations;

pub use error::DatabaseError;

/// Shared handle to the job database.
///
/// One connection serves every pipeline; `Clone` shares it. File databases
/// run in WAL mode with a busy timeout so a second `ts2sh` process reading
/// job status does not stall a running conversion.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

const FILE_PRAGMAS: &str =
    "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;";
const MEMORY_PRAGMAS: &str = "PRAGMA foreign_keys=ON;";

impl Database {
    /// Opens the database file, creating it and its parent directory if
    /// needed, and brings the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let db = Self::prepare(Connection::open(path)?, FILE_PRAGMAS)?;
        log::info!("Job database ready at {}", path.display());
        Ok(db)
    }

    /// Private in-memory database, used by tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?, MEMORY_PRAGMAS)
    }

    fn prepare(conn: Connection, pragmas: &str) -> Result<Self, DatabaseError> {
        conn.execute_batch(pragmas)?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside a transaction that commits only if `f` succeeds.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let mut conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// `~/.ts2sh/data/ts2sh.db`, or `None` when there is no home directory.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ts2sh").join("data").join("ts2sh.db"))
}
