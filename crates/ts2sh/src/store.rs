//! Job store: maps `jobs` rows to [`Job`] snapshots and enforces the state
//! machine on every write.
//!
//! Each write is a single conditional `UPDATE` keyed on the job's id and
//! current status, so updates to one job are atomic without serializing
//! unrelated jobs behind an application-level lock.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::db::job_repo::{self, FileMeta, FileRow, JobRow};
use crate::db::{Database, DatabaseError};
use crate::job::{Checkpoint, Job, JobStatus, SourceEntry, SourceFile};

/// Most jobs returned by [`JobStore::list`].
pub const LIST_LIMIT: usize = 100;

/// Result of a state-changing write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write landed; carries the fresh snapshot.
    Applied(Job),
    /// The job no longer exists (deleted).
    Gone,
    /// The job exists but its state does not allow this write.
    Rejected { current: JobStatus },
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied(_))
    }
}

/// What was removed by [`JobStore::delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedJob {
    pub id: String,
    pub status: JobStatus,
    pub artifact_location: Option<PathBuf>,
}

#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Inserts a new `pending` job with its source files.
    pub fn create(&self, project_name: &str, files: Vec<SourceFile>) -> Result<Job, DatabaseError> {
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let row = JobRow {
            id: id.clone(),
            project_name: project_name.to_string(),
            status: JobStatus::Pending.as_str().to_string(),
            progress: 0,
            message: Some("Queued".to_string()),
            error: None,
            artifact_path: None,
            created_at: format_timestamp(now),
            updated_at: format_timestamp(now),
            completed_at: None,
        };
        let file_rows: Vec<FileRow> = files
            .into_iter()
            .enumerate()
            .map(|(i, f)| FileRow {
                position: i as u32,
                path: f.path,
                size: f.size as i64,
                content: f.content,
            })
            .collect();

        job_repo::insert(&self.db, &row, &file_rows)?;

        // Re-read so the returned snapshot matches what later reads will see
        // (timestamps are truncated to microseconds on the way in).
        match job_repo::find_with_files(&self.db, &id)? {
            Some((row, files)) => job_from_row(row, files),
            None => Err(DatabaseError::CorruptRow {
                id,
                reason: "row missing immediately after insert".to_string(),
            }),
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<Job>, DatabaseError> {
        match job_repo::find_with_files(&self.db, id)? {
            Some((row, files)) => job_from_row(row, files).map(Some),
            None => Ok(None),
        }
    }

    /// The [`LIST_LIMIT`] most recently created jobs, newest first.
    pub fn list(&self) -> Result<Vec<Job>, DatabaseError> {
        job_repo::list_recent(&self.db, LIST_LIMIT)?
            .into_iter()
            .map(|(row, files)| job_from_row(row, files))
            .collect()
    }

    /// Submitted files with their content, for staging. `None` once the job
    /// has been deleted.
    pub fn load_sources(&self, id: &str) -> Result<Option<Vec<SourceFile>>, DatabaseError> {
        let Some(rows) = job_repo::load_contents(&self.db, id)? else {
            return Ok(None);
        };
        let files = rows
            .into_iter()
            .map(|row| SourceFile {
                path: row.path,
                size: row.size.max(0) as u64,
                content: row.content,
            })
            .collect();
        Ok(Some(files))
    }

    pub fn ids_with_status(&self, status: JobStatus) -> Result<Vec<String>, DatabaseError> {
        job_repo::ids_by_status(&self.db, status.as_str())
    }

    /// `pending → processing` at the given checkpoint.
    pub fn start(&self, id: &str, checkpoint: Checkpoint) -> Result<WriteOutcome, DatabaseError> {
        let changed = job_repo::mark_processing(
            &self.db,
            id,
            checkpoint.percent(),
            checkpoint.message(),
            &format_timestamp(Utc::now()),
        )?;
        self.outcome(id, changed)
    }

    /// Raises progress on a non-terminal job. Lower values are ignored.
    pub fn update_progress(
        &self,
        id: &str,
        checkpoint: Checkpoint,
    ) -> Result<WriteOutcome, DatabaseError> {
        let changed = job_repo::advance_progress(
            &self.db,
            id,
            checkpoint.percent(),
            checkpoint.message(),
            &format_timestamp(Utc::now()),
        )?;
        self.outcome(id, changed)
    }

    /// `processing → completed`, progress forced to 100.
    pub fn complete(&self, id: &str, artifact: &Path) -> Result<WriteOutcome, DatabaseError> {
        let changed = job_repo::mark_completed(
            &self.db,
            id,
            &artifact.to_string_lossy(),
            Checkpoint::Completed.message(),
            &format_timestamp(Utc::now()),
        )?;
        self.outcome(id, changed)
    }

    /// `processing → failed`; progress stays where it was.
    pub fn fail(&self, id: &str, error: &str) -> Result<WriteOutcome, DatabaseError> {
        let changed =
            job_repo::mark_failed(&self.db, id, error, &format_timestamp(Utc::now()))?;
        self.outcome(id, changed)
    }

    /// Removes the job record. Returns `None` if it did not exist.
    pub fn delete(&self, id: &str) -> Result<Option<DeletedJob>, DatabaseError> {
        let Some(row) = job_repo::delete(&self.db, id)? else {
            return Ok(None);
        };
        let status = parse_status(&row)?;
        Ok(Some(DeletedJob {
            id: row.id,
            status,
            artifact_location: row.artifact_path.map(PathBuf::from),
        }))
    }

    fn outcome(&self, id: &str, changed: usize) -> Result<WriteOutcome, DatabaseError> {
        match self.get(id)? {
            None => Ok(WriteOutcome::Gone),
            Some(job) if changed > 0 => Ok(WriteOutcome::Applied(job)),
            Some(job) => Ok(WriteOutcome::Rejected {
                current: job.status,
            }),
        }
    }
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str, job_id: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow {
            id: job_id.to_string(),
            reason: format!("bad timestamp '{}': {}", s, e),
        })
}

fn parse_status(row: &JobRow) -> Result<JobStatus, DatabaseError> {
    JobStatus::parse(&row.status).ok_or_else(|| DatabaseError::CorruptRow {
        id: row.id.clone(),
        reason: format!("unknown status '{}'", row.status),
    })
}

fn job_from_row(row: JobRow, files: Vec<FileMeta>) -> Result<Job, DatabaseError> {
    let status = parse_status(&row)?;
    let created_at = parse_timestamp(&row.created_at, &row.id)?;
    let updated_at = parse_timestamp(&row.updated_at, &row.id)?;
    let completed_at = row
        .completed_at
        .as_deref()
        .map(|s| parse_timestamp(s, &row.id))
        .transpose()?;

    let source_files = files
        .into_iter()
        .map(|f| SourceEntry {
            path: f.path,
            size: f.size.max(0) as u64,
        })
        .collect();

    Ok(Job {
        id: row.id,
        project_name: row.project_name,
        status,
        progress: row.progress.min(100),
        message: row.message,
        error_message: if status == JobStatus::Failed {
            row.error
        } else {
            None
        },
        artifact_location: if status == JobStatus::Completed {
            row.artifact_path.map(PathBuf::from)
        } else {
            None
        },
        created_at,
        updated_at,
        completed_at,
        source_files,
    })
}
