//! Versioned schema migrations, recorded in `_migrations`.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_jobs_table",
        sql: include_str!("sql/001_create_jobs.sql"),
    },
    Migration {
        version: 2,
        description: "create_job_files_table",
        sql: include_str!("sql/002_create_job_files.sql"),
    },
];

fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Highest migration version recorded in the database.
pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

/// Brings the schema up to date. Each migration commits together with its
/// `_migrations` row, so an interrupted upgrade resumes where it stopped.
///
/// A database written by a newer build is refused rather than guessed at.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = schema_version(conn)?;
    if current > latest_version() {
        return Err(DatabaseError::Migration {
            version: current,
            reason: format!(
                "database schema is newer than this build supports (v{})",
                latest_version()
            ),
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        log::info!(
            "Applying schema v{} ({})",
            migration.version,
            migration.description
        );

        let failed = |e: rusqlite::Error| DatabaseError::Migration {
            version: migration.version,
            reason: e.to_string(),
        };
        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;
    }

    Ok(())
}
