//! Job domain types: the record the orchestrator persists and the state
//! machine it follows.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// `Pending → Processing → {Completed | Failed}`. Terminal states never change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed progress points reported as the pipeline advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Checkpoint {
    Started,
    Staged,
    Compiled,
    Packaged,
    Completed,
}

impl Checkpoint {
    pub fn percent(&self) -> u8 {
        match self {
            Checkpoint::Started => 10,
            Checkpoint::Staged => 25,
            Checkpoint::Compiled => 60,
            Checkpoint::Packaged => 90,
            Checkpoint::Completed => 100,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Checkpoint::Started => "Preparing workspace",
            Checkpoint::Staged => "Compiling sources",
            Checkpoint::Compiled => "Packaging artifact",
            Checkpoint::Packaged => "Writing artifact",
            Checkpoint::Completed => "Conversion completed",
        }
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Checkpoint::Started => write!(f, "started"),
            Checkpoint::Staged => write!(f, "staged"),
            Checkpoint::Compiled => write!(f, "compiled"),
            Checkpoint::Packaged => write!(f, "packaged"),
            Checkpoint::Completed => write!(f, "completed"),
        }
    }
}

/// One submitted file, with its bytes. Only staging needs the content;
/// job snapshots carry a [`SourceEntry`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Relative path, `/`-separated.
    pub path: String,
    pub content: Vec<u8>,
    pub size: u64,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size: content.len() as u64,
            content,
        }
    }

    pub fn entry(&self) -> SourceEntry {
        SourceEntry {
            path: self.path.clone(),
            size: self.size,
        }
    }
}

/// Path and size of a submitted file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SourceEntry {
    pub path: String,
    pub size: u64,
}

/// Snapshot of a job as persisted by the store.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub project_name: String,
    pub status: JobStatus,
    /// 0 to 100.
    pub progress: u8,
    /// What the pipeline is currently doing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set only once the job has failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Set only once the job has completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_location: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub source_files: Vec<SourceEntry>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
