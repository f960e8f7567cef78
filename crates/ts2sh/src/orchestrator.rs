//! The public face of the converter: accepts jobs, runs their pipelines in
//! the background and answers lookups from the store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::compiler::Compiler;
use crate::config::Config;
use crate::db::Database;
use crate::error::{ConvertError, Result};
use crate::job::{Job, JobStatus, SourceFile};
use crate::pipeline::{Pipeline, PipelineConfig, PipelineContext, StoreProgress};
use crate::sanitize;
use crate::store::{JobStore, WriteOutcome};
use crate::worker::{ShutdownSignal, WorkerPool};

pub use crate::pipeline::INTERRUPTED_MESSAGE;

/// A downloadable artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// What [`Orchestrator::recover`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Pending jobs scheduled again.
    pub requeued: Vec<String>,
    /// Processing jobs marked failed.
    pub failed: Vec<String>,
    /// Leftover entries removed from the staging directory.
    pub swept_staging: usize,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: JobStore,
    pipeline: Arc<Pipeline>,
    pool: WorkerPool,
    events: JobEventBroadcaster,
    shutdown: ShutdownSignal,
}

impl Orchestrator {
    /// Builds an orchestrator that compiles with the configured subprocess.
    pub fn new(config: &Config, store: JobStore) -> Self {
        let pipeline = Pipeline::from_config(Arc::new(PipelineConfig::from_config(config)));
        Self::with_pipeline(config, store, pipeline)
    }

    /// Builds an orchestrator around a custom [`Compiler`].
    pub fn with_compiler(config: &Config, store: JobStore, compiler: Arc<dyn Compiler>) -> Self {
        let pipeline =
            Pipeline::with_compiler(Arc::new(PipelineConfig::from_config(config)), compiler);
        Self::with_pipeline(config, store, pipeline)
    }

    /// Opens the database named by `config` and builds an orchestrator on it.
    pub fn open(config: &Config) -> Result<Self> {
        let db = Database::open(&config.database_path)?;
        Ok(Self::new(config, JobStore::new(db)))
    }

    fn with_pipeline(config: &Config, store: JobStore, pipeline: Pipeline) -> Self {
        let shutdown = ShutdownSignal::new();
        Self {
            store,
            pipeline: Arc::new(pipeline.with_shutdown(shutdown.clone())),
            pool: WorkerPool::new(config.max_concurrent_pipelines),
            events: JobEventBroadcaster::default(),
            shutdown,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Validates the request, persists a pending job and schedules its
    /// pipeline. Returns without waiting for any stage to run.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn submit(&self, project_name: &str, files: Vec<SourceFile>) -> Result<Job> {
        if self.shutdown.is_triggered() {
            return Err(ConvertError::ShuttingDown);
        }
        let project_name = project_name.trim();
        if project_name.is_empty() {
            return Err(ConvertError::InvalidRequest(
                "Project name is required".to_string(),
            ));
        }
        if files.is_empty() {
            return Err(ConvertError::InvalidRequest("No files uploaded".to_string()));
        }

        let job = self.store.create(project_name, files)?;
        info!(job_id = %job.id, files = job.source_files.len(), "Job submitted");
        self.events.publish(&job);
        self.schedule(job.clone());
        Ok(job)
    }

    /// Queues the job's pipeline. Source contents are read from the store
    /// only once a worker slot is free.
    fn schedule(&self, job: Job) {
        let pipeline = Arc::clone(&self.pipeline);
        let store = self.store.clone();
        let shutdown = self.shutdown.clone();
        let progress = StoreProgress::new(&job.id, self.store.clone(), self.events.clone());

        self.pool.spawn(async move {
            if shutdown.is_triggered() {
                debug!(job_id = %job.id, "Shutting down, job stays pending");
                return;
            }
            let sources = match store.load_sources(&job.id) {
                Ok(Some(sources)) => sources,
                Ok(None) => {
                    debug!(job_id = %job.id, "Job deleted before it started");
                    return;
                }
                Err(e) => {
                    error!(job_id = %job.id, "Failed to load job sources, job stays pending: {}", e);
                    return;
                }
            };

            let (result, _ctx) = pipeline
                .run(PipelineContext::new(job, sources), &progress)
                .await;
            debug!(job_id = %result.job_id, outcome = ?result.outcome, "Pipeline finished");
        });
    }

    /// Current snapshot of a job.
    pub fn get(&self, job_id: &str) -> Result<Job> {
        self.store
            .get(job_id)?
            .ok_or_else(|| ConvertError::NotFound(job_id.to_string()))
    }

    /// All jobs, most recently created first.
    pub fn list(&self) -> Result<Vec<Job>> {
        Ok(self.store.list()?)
    }

    /// Removes a job and its artifact. A pipeline still running for the job
    /// notices at its next write and discards its own work.
    pub fn delete(&self, job_id: &str) -> Result<()> {
        let deleted = self
            .store
            .delete(job_id)?
            .ok_or_else(|| ConvertError::NotFound(job_id.to_string()))?;

        let dir = self.pipeline.config().artifact_dir_for(job_id);
        remove_if_present(&dir, true);
        if let Some(location) = &deleted.artifact_location {
            if !location.starts_with(&dir) {
                remove_if_present(location, false);
            }
        }

        info!(job_id = %job_id, status = %deleted.status, "Job deleted");
        Ok(())
    }

    /// Reads the artifact of a completed job.
    pub fn download(&self, job_id: &str) -> Result<Artifact> {
        let job = self.get(job_id)?;
        if job.status != JobStatus::Completed {
            return Err(ConvertError::ArtifactNotReady {
                job_id: job.id,
                status: job.status,
            });
        }
        let path = job
            .artifact_location
            .ok_or_else(|| ConvertError::NotFound(format!("artifact for job {}", job_id)))?;

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConvertError::NotFound(format!(
                    "artifact for job {}",
                    job_id
                )));
            }
            Err(e) => return Err(ConvertError::Io { path, source: e }),
        };

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| sanitize::artifact_file_name(&job.project_name));

        Ok(Artifact { file_name, bytes })
    }

    /// Receiver of job events emitted after each persisted change.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Resolves once no pipeline is queued or running.
    pub async fn wait_idle(&self) {
        self.pool.wait_idle().await;
    }

    /// Stops accepting jobs, interrupts running pipelines and waits for them
    /// to settle. Interrupted jobs are failed with [`INTERRUPTED_MESSAGE`]
    /// and their staging directories removed; queued jobs stay `pending`
    /// for [`Orchestrator::recover`].
    pub async fn shutdown(&self) {
        if !self.shutdown.is_triggered() {
            info!(in_flight = self.pool.in_flight(), "Shutting down");
            self.shutdown.trigger();
        }
        self.pool.wait_idle().await;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Polls until the job reaches a terminal state.
    pub async fn wait_for_terminal(&self, job_id: &str, poll: Duration) -> Result<Job> {
        loop {
            let job = self.get(job_id)?;
            if job.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Picks up after a previous process: leftover staging directories are
    /// removed, pending jobs are scheduled again and jobs caught mid-run are
    /// failed.
    ///
    /// Only call this when no other process is serving the same database and
    /// staging directory.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        if self.pool.in_flight() == 0 {
            report.swept_staging = self.sweep_staging();
        } else {
            warn!("Pipelines are running, leaving the staging directory alone");
        }

        for id in self.store.ids_with_status(JobStatus::Processing)? {
            match self.store.fail(&id, INTERRUPTED_MESSAGE)? {
                WriteOutcome::Applied(job) => {
                    self.events.publish(&job);
                    report.failed.push(id);
                }
                other => debug!(job_id = %id, outcome = ?other, "Job changed during recovery"),
            }
        }

        for id in self.store.ids_with_status(JobStatus::Pending)? {
            if let Some(job) = self.store.get(&id)? {
                self.schedule(job);
                report.requeued.push(id);
            }
        }

        if report != RecoveryReport::default() {
            info!(
                requeued = report.requeued.len(),
                failed = report.failed.len(),
                swept_staging = report.swept_staging,
                "Recovered jobs from a previous run"
            );
        }
        Ok(report)
    }

    fn sweep_staging(&self) -> usize {
        let root = &self.pipeline.config().staging_directory;
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!("Failed to read staging directory {}: {}", root.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if remove_if_present(&entry.path(), is_dir) {
                removed += 1;
            }
        }
        removed
    }
}

/// Returns whether something was removed.
fn remove_if_present(path: &Path, is_dir: bool) -> bool {
    let result = if is_dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchestrator() -> (tempfile::TempDir, Orchestrator) {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            staging_directory: tmp.path().join("staging"),
            artifact_directory: tmp.path().join("artifacts"),
            ..Config::default()
        };
        let store = JobStore::new(Database::open_in_memory().unwrap());
        (tmp, Orchestrator::new(&config, store))
    }

    #[tokio::test]
    async fn test_blank_project_name_is_rejected() {
        let (_tmp, orchestrator) = orchestrator();
        let err = orchestrator
            .submit("   ", vec![SourceFile::new("index.ts", "x")])
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidRequest(_)));
        assert!(orchestrator.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_list_is_rejected() {
        let (_tmp, orchestrator) = orchestrator();
        let err = orchestrator.submit("demo", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: No files uploaded");
        assert!(orchestrator.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (_tmp, orchestrator) = orchestrator();
        assert!(matches!(
            orchestrator.get("missing"),
            Err(ConvertError::NotFound(_))
        ));
        assert!(matches!(
            orchestrator.delete("missing"),
            Err(ConvertError::NotFound(_))
        ));
        assert!(matches!(
            orchestrator.download("missing"),
            Err(ConvertError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_refused() {
        let (_tmp, orchestrator) = orchestrator();
        orchestrator.shutdown().await;

        let err = orchestrator
            .submit("demo", vec![SourceFile::new("index.ts", "x")])
            .unwrap_err();
        assert!(matches!(err, ConvertError::ShuttingDown));
        assert!(orchestrator.is_shutting_down());
        assert!(orchestrator.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recover_fails_interrupted_jobs() {
        let (_tmp, orchestrator) = orchestrator();
        let store = orchestrator.store().clone();
        let job = store
            .create("demo", vec![SourceFile::new("index.ts", "x")])
            .unwrap();
        store
            .start(&job.id, crate::job::Checkpoint::Started)
            .unwrap();

        let report = orchestrator.recover().unwrap();

        assert_eq!(report.failed, vec![job.id.clone()]);
        assert!(report.requeued.is_empty());
        let job = orchestrator.get(&job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        assert_eq!(job.progress, 10);
    }
}
