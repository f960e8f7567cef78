//! Job event broadcaster.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::job::{Job, JobStatus};

/// A job snapshot change, emitted after the store accepted it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            error: job.error_message.clone(),
            timestamp: job.updated_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Fan-out of [`JobEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn publish(&self, job: &Job) {
        self.send(JobEvent::from_job(job));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus, progress: u8) -> Job {
        let now = Utc::now();
        Job {
            id: "job-1".to_string(),
            project_name: "demo".to_string(),
            status,
            progress,
            message: Some("Compiling sources".to_string()),
            error_message: None,
            artifact_location: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            source_files: Vec::new(),
        }
    }

    #[test]
    fn test_send_without_subscribers_is_fine() {
        let broadcaster = JobEventBroadcaster::new(4);
        broadcaster.publish(&job(JobStatus::Processing, 25));
    }

    #[test]
    fn test_subscriber_receives_published_snapshot() {
        let broadcaster = JobEventBroadcaster::new(4);
        let mut rx = broadcaster.subscribe();

        broadcaster.publish(&job(JobStatus::Processing, 25));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.job_id, "job-1");
        assert_eq!(event.status, JobStatus::Processing);
        assert_eq!(event.progress, 25);
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_clones_share_channel() {
        let broadcaster = JobEventBroadcaster::default();
        let clone = broadcaster.clone();
        let mut rx = broadcaster.subscribe();

        clone.publish(&job(JobStatus::Completed, 100));

        assert!(rx.try_recv().unwrap().is_terminal());
    }
}
