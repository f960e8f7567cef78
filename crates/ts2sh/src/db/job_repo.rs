//! Job repository: row-level operations for the `jobs` and `job_files` tables.
//!
//! State-changing updates are conditional on the row's current status, so a
//! single `UPDATE` either applies atomically or touches nothing. Callers read
//! the affected-row count to tell the two apart.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub project_name: String,
    pub status: String,
    pub progress: u8,
    pub message: Option<String>,
    pub error: Option<String>,
    pub artifact_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            project_name: row.get("project_name")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            message: row.get("message")?,
            error: row.get("error")?,
            artifact_path: row.get("artifact_path")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// One submitted source file, in submission order.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub position: u32,
    pub path: String,
    pub size: i64,
    pub content: Vec<u8>,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            position: row.get("position")?,
            path: row.get("path")?,
            size: row.get("size")?,
            content: row.get("content")?,
        })
    }
}

/// Path and size of a stored file, read without its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub position: u32,
    pub path: String,
    pub size: i64,
}

impl FileMeta {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            position: row.get("position")?,
            path: row.get("path")?,
            size: row.get("size")?,
        })
    }
}

const SELECT_JOB: &str = "SELECT id, project_name, status, progress, message, error, \
     artifact_path, created_at, updated_at, completed_at FROM jobs";

/// Inserts a job row together with its source files in one transaction.
pub fn insert(db: &Database, job: &JobRow, files: &[FileRow]) -> Result<(), DatabaseError> {
    db.with_tx(|tx| {
        tx.execute(
            "INSERT INTO jobs (id, project_name, status, progress, message, error,
             artifact_path, created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.id,
                job.project_name,
                job.status,
                job.progress,
                job.message,
                job.error,
                job.artifact_path,
                job.created_at,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO job_files (job_id, position, path, size, content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for file in files {
                stmt.execute(params![
                    job.id,
                    file.position,
                    file.path,
                    file.size,
                    file.content
                ])?;
            }
        }
        Ok(())
    })
}

fn find_in(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT_JOB),
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, id))
}

fn file_meta_in(conn: &Connection, id: &str) -> Result<Vec<FileMeta>, DatabaseError> {
    let mut stmt = conn.prepare_cached(
        "SELECT position, path, size FROM job_files WHERE job_id = ?1 ORDER BY position",
    )?;
    let files = stmt
        .query_map(params![id], FileMeta::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(files)
}

/// Reads a job row and its file list under one lock, so the pair is
/// consistent. File contents are not read.
pub fn find_with_files(
    db: &Database,
    id: &str,
) -> Result<Option<(JobRow, Vec<FileMeta>)>, DatabaseError> {
    db.with_conn(|conn| {
        let Some(row) = find_in(conn, id)? else {
            return Ok(None);
        };
        let files = file_meta_in(conn, id)?;
        Ok(Some((row, files)))
    })
}

/// Loads the stored files of a job with their content, in submission
/// order. `None` if the job does not exist.
pub fn load_contents(db: &Database, id: &str) -> Result<Option<Vec<FileRow>>, DatabaseError> {
    db.with_conn(|conn| {
        if find_in(conn, id)?.is_none() {
            return Ok(None);
        }
        let mut stmt = conn.prepare(
            "SELECT position, path, size, content FROM job_files
             WHERE job_id = ?1 ORDER BY position",
        )?;
        let files = stmt
            .query_map(params![id], FileRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(files))
    })
}

/// Returns at most `limit` jobs, most recently created first, with their
/// file lists. Rows created in the same instant fall back to insertion
/// order, newest first.
pub fn list_recent(
    db: &Database,
    limit: usize,
) -> Result<Vec<(JobRow, Vec<FileMeta>)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            SELECT_JOB
        ))?;
        let rows: Vec<JobRow> = stmt
            .query_map(params![limit as i64], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| {
                let files = file_meta_in(conn, &row.id)?;
                Ok((row, files))
            })
            .collect()
    })
}

/// Returns the IDs of jobs in the given status, oldest first.
pub fn ids_by_status(db: &Database, status: &str) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT id FROM jobs WHERE status = ?1 ORDER BY created_at ASC, rowid ASC")?;
        let ids = stmt
            .query_map(params![status], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })
}

/// `pending → processing`. Returns the number of rows changed (0 or 1).
pub fn mark_processing(
    db: &Database,
    id: &str,
    progress: u8,
    message: &str,
    updated_at: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'processing', progress = MAX(progress, ?2),
             message = ?3, updated_at = ?4
             WHERE id = ?1 AND status = 'pending'",
            params![id, progress, message, updated_at],
        )?;
        Ok(changed)
    })
}

/// Raises progress on a non-terminal job. Progress never decreases.
pub fn advance_progress(
    db: &Database,
    id: &str,
    progress: u8,
    message: &str,
    updated_at: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET progress = MAX(progress, ?2), message = ?3, updated_at = ?4
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![id, progress, message, updated_at],
        )?;
        Ok(changed)
    })
}

/// `processing → completed`, forcing progress to 100.
pub fn mark_completed(
    db: &Database,
    id: &str,
    artifact_path: &str,
    message: &str,
    completed_at: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'completed', progress = 100, artifact_path = ?2,
             message = ?3, error = NULL, updated_at = ?4, completed_at = ?4
             WHERE id = ?1 AND status = 'processing'",
            params![id, artifact_path, message, completed_at],
        )?;
        Ok(changed)
    })
}

/// `processing → failed`. Progress is left at its last value.
pub fn mark_failed(
    db: &Database,
    id: &str,
    error: &str,
    completed_at: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'failed', error = ?2, message = 'Failed',
             updated_at = ?3, completed_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![id, error, completed_at],
        )?;
        Ok(changed)
    })
}

/// Deletes a job and (via cascade) its files, returning the row that was removed.
pub fn delete(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_tx(|tx| {
        let row = find_in(tx, id)?;
        if row.is_some() {
            tx.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        }
        Ok(row)
    })
}
