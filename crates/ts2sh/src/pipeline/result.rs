use std::path::PathBuf;

use crate::job::Job;

/// How a pipeline run ended, from the pipeline's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { artifact_path: PathBuf },
    Failed { error: String },
    /// The job was deleted or taken over while running; nothing was kept.
    Discarded,
}

#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: String,
    pub outcome: JobOutcome,
}

impl JobResult {
    pub fn success(job: &Job, artifact_path: PathBuf) -> Self {
        Self {
            job_id: job.id.clone(),
            outcome: JobOutcome::Completed { artifact_path },
        }
    }

    pub fn failure(job: &Job, error: String) -> Self {
        Self {
            job_id: job.id.clone(),
            outcome: JobOutcome::Failed { error },
        }
    }

    pub fn discarded(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            outcome: JobOutcome::Discarded,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Completed { .. })
    }
}
