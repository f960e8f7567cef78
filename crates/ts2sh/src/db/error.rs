//! Errors raised by the job database.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed, or the schema is newer than this build.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored row could not be mapped back to a job.
    #[error("Corrupt job row '{id}': {reason}")]
    CorruptRow { id: String, reason: String },

    /// A thread panicked while holding the connection.
    #[error("Database lock poisoned")]
    LockPoisoned,
}
