use std::path::PathBuf;

use tracing::warn;

use crate::broadcast::JobEventBroadcaster;
use crate::db::DatabaseError;
use crate::job::{Checkpoint, JobStatus};
use crate::store::{JobStore, WriteOutcome};

/// Events emitted by the pipeline during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started,
    Phase { checkpoint: Checkpoint },
    Completed { artifact_path: PathBuf },
    Failed { error: String },
}

/// Whether the pipeline should keep going after an event was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Recorded,
    /// The job is gone; stop and keep nothing.
    Discarded,
    /// The job exists but its state did not allow the write.
    Rejected { current: JobStatus },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent) -> Result<Delivery, DatabaseError>;
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) -> Result<Delivery, DatabaseError> {
        Ok(Delivery::Recorded)
    }
}

/// Records events for unit tests and always accepts them.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingProgress {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

#[cfg(test)]
impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) -> Result<Delivery, DatabaseError> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(Delivery::Recorded)
    }
}

/// Persists each event as a conditional store write and broadcasts the
/// resulting snapshot when the write lands.
pub struct StoreProgress {
    job_id: String,
    store: JobStore,
    events: JobEventBroadcaster,
}

impl StoreProgress {
    pub fn new(job_id: impl Into<String>, store: JobStore, events: JobEventBroadcaster) -> Self {
        Self {
            job_id: job_id.into(),
            store,
            events,
        }
    }
}

impl ProgressReporter for StoreProgress {
    fn report(&self, event: ProgressEvent) -> Result<Delivery, DatabaseError> {
        let outcome = match &event {
            ProgressEvent::Started => self.store.start(&self.job_id, Checkpoint::Started)?,
            ProgressEvent::Phase { checkpoint } => {
                self.store.update_progress(&self.job_id, *checkpoint)?
            }
            ProgressEvent::Completed { artifact_path } => {
                self.store.complete(&self.job_id, artifact_path)?
            }
            ProgressEvent::Failed { error } => self.store.fail(&self.job_id, error)?,
        };

        match outcome {
            WriteOutcome::Applied(job) => {
                self.events.publish(&job);
                Ok(Delivery::Recorded)
            }
            WriteOutcome::Gone => Ok(Delivery::Discarded),
            WriteOutcome::Rejected { current } => {
                warn!(
                    job_id = %self.job_id,
                    status = %current,
                    "Job is no longer in a state this pipeline can update"
                );
                Ok(Delivery::Rejected { current })
            }
        }
    }
}
