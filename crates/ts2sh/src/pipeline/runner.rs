use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::compiler::{CommandCompiler, Compiler};
use crate::db::DatabaseError;
use crate::job::{Checkpoint, JobStatus};
use crate::packager::Packager;
use crate::sanitize;
use crate::staging::StagingArea;
use crate::worker::ShutdownSignal;

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::PipelineError;
use super::progress::{Delivery, ProgressEvent, ProgressReporter};
use super::result::JobResult;

/// Why a run stopped before its final write.
enum Halt {
    Failed(PipelineError),
    Discarded,
    Interrupted,
    Store(DatabaseError),
}

impl From<PipelineError> for Halt {
    fn from(e: PipelineError) -> Self {
        Halt::Failed(e)
    }
}

fn advance(progress: &dyn ProgressReporter, event: ProgressEvent) -> Result<(), Halt> {
    match progress.report(event) {
        Ok(Delivery::Recorded) => Ok(()),
        Ok(Delivery::Discarded) | Ok(Delivery::Rejected { .. }) => Err(Halt::Discarded),
        Err(e) => Err(Halt::Store(e)),
    }
}

fn missing(step: &str) -> PipelineError {
    PipelineError::Task(format!("{} step did not run", step))
}

fn task_error(e: tokio::task::JoinError) -> PipelineError {
    PipelineError::Task(e.to_string())
}

/// Writes the script next to its final location and renames it into place,
/// so a reader never sees a partial artifact.
fn write_artifact(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "artifact path has no parent")
    })?;
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(content)?;
    file.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o755))?;
    }
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    compiler: Arc<dyn Compiler>,
    packager: Packager,
    shutdown: ShutdownSignal,
}

impl Pipeline {
    /// Production constructor: compiles with the configured subprocess.
    pub fn from_config(config: Arc<PipelineConfig>) -> Self {
        let compiler = Arc::new(CommandCompiler::new(config.compiler.clone()));
        Self::with_compiler(config, compiler)
    }

    /// Uses `compiler` in place of the configured subprocess.
    pub fn with_compiler(config: Arc<PipelineConfig>, compiler: Arc<dyn Compiler>) -> Self {
        let packager = Packager::new(config.packager.clone());
        Self {
            config,
            compiler,
            packager,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Runs stop at their next await point once `shutdown` is triggered.
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full conversion for a single job.
    /// Returns a (JobResult, PipelineContext) pair; the staging directory is
    /// already removed when this returns, including after a shutdown.
    pub async fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (JobResult, PipelineContext) {
        let span = info_span!("pipeline", job_id = %ctx.job.id);

        async move {
            let executed = tokio::select! {
                biased;
                executed = self.execute(&mut ctx, progress) => executed,
                _ = self.shutdown.triggered() => Err(Halt::Interrupted),
            };

            let result = match executed {
                Ok(artifact_path) => self.finish(&ctx, artifact_path, progress).await,
                Err(Halt::Failed(e)) => self.fail(&ctx, e.to_string(), progress).await,
                Err(Halt::Store(e)) => {
                    error!("Failed to record job progress: {}", e);
                    self.fail(&ctx, format!("Job store error: {}", e), progress)
                        .await
                }
                Err(Halt::Discarded) => {
                    info!("Job was removed while running, discarding work");
                    self.remove_artifacts(&ctx.job.id).await;
                    JobResult::discarded(&ctx.job)
                }
                Err(Halt::Interrupted) => {
                    warn!("Shutdown requested, abandoning conversion");
                    self.fail(&ctx, PipelineError::Interrupted.to_string(), progress)
                        .await
                }
            };

            release_staging(&mut ctx).await;
            (result, ctx)
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, Halt> {
        advance(progress, ProgressEvent::Started)?;

        // Step 1: Materialize sources
        self.step_stage(ctx).instrument(info_span!("stage")).await?;
        advance(
            progress,
            ProgressEvent::Phase {
                checkpoint: Checkpoint::Staged,
            },
        )?;

        // Step 2: Compile
        self.step_compile(ctx).instrument(info_span!("compile")).await?;
        advance(
            progress,
            ProgressEvent::Phase {
                checkpoint: Checkpoint::Compiled,
            },
        )?;

        // Step 3: Package and self-check
        self.step_package(ctx).instrument(info_span!("package")).await?;
        advance(
            progress,
            ProgressEvent::Phase {
                checkpoint: Checkpoint::Packaged,
            },
        )?;

        // Step 4: Write artifact
        self.step_write_artifact(ctx)
            .instrument(info_span!("write_artifact"))
            .await?;

        ctx.artifact_path
            .clone()
            .ok_or_else(|| Halt::Failed(missing("write_artifact")))
    }

    async fn step_stage(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = self.config.staging_directory.clone();
        let job_id = ctx.job.id.clone();
        let files = std::mem::take(&mut ctx.sources);
        let count = files.len();

        let staging =
            tokio::task::spawn_blocking(move || StagingArea::create(&root, &job_id, &files))
                .await
                .map_err(task_error)??;

        debug!(files = count, "Sources staged");
        ctx.staging = Some(staging);
        Ok(())
    }

    async fn step_compile(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let staging = ctx.staging.as_ref().ok_or_else(|| missing("stage"))?;
        let compiled = self.compiler.compile(staging).await?;

        debug!(
            passthrough_assets = compiled.passthrough_assets,
            "Sources compiled"
        );
        ctx.compiled = Some(compiled);
        Ok(())
    }

    async fn step_package(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx
            .compiled
            .as_ref()
            .ok_or_else(|| missing("compile"))?
            .root
            .clone();
        let packager = self.packager.clone();
        let project_name = ctx.job.project_name.clone();

        let packaged = tokio::task::spawn_blocking(move || {
            packager.package(&root, &project_name, Utc::now())
        })
        .await
        .map_err(task_error)??;

        ctx.packaged = Some(packaged);
        Ok(())
    }

    async fn step_write_artifact(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let packaged = ctx.packaged.as_ref().ok_or_else(|| missing("package"))?;
        let path = self
            .config
            .artifact_dir_for(&ctx.job.id)
            .join(sanitize::artifact_file_name(&ctx.job.project_name));

        let target = path.clone();
        let script = packaged.script.clone();
        tokio::task::spawn_blocking(move || write_artifact(&target, script.as_bytes()))
            .await
            .map_err(task_error)?
            .map_err(|source| PipelineError::ArtifactWrite {
                path: path.clone(),
                source,
            })?;

        debug!(artifact = %sanitize::redact_path(&path), "Artifact written");
        ctx.artifact_path = Some(path);
        Ok(())
    }

    async fn finish(
        &self,
        ctx: &PipelineContext,
        artifact_path: PathBuf,
        progress: &dyn ProgressReporter,
    ) -> JobResult {
        let event = ProgressEvent::Completed {
            artifact_path: artifact_path.clone(),
        };
        match progress.report(event) {
            Ok(Delivery::Recorded) => {
                info!(
                    artifact = %sanitize::redact_path(&artifact_path),
                    "Conversion completed"
                );
                JobResult::success(&ctx.job, artifact_path)
            }
            Ok(Delivery::Discarded) | Ok(Delivery::Rejected { .. }) => {
                info!("Job was removed before completion, discarding artifact");
                self.remove_artifacts(&ctx.job.id).await;
                JobResult::discarded(&ctx.job)
            }
            Err(e) => {
                error!("Failed to record job completion: {}", e);
                self.settle_completion_error(ctx, artifact_path, e, progress)
                    .await
            }
        }
    }

    /// The completion write may have landed before the store error surfaced,
    /// so the artifact is kept unless the job ends up failed or gone.
    async fn settle_completion_error(
        &self,
        ctx: &PipelineContext,
        artifact_path: PathBuf,
        cause: DatabaseError,
        progress: &dyn ProgressReporter,
    ) -> JobResult {
        let error = format!("Job store error: {}", cause);
        match progress.report(ProgressEvent::Failed {
            error: error.clone(),
        }) {
            Ok(Delivery::Rejected {
                current: JobStatus::Completed,
            }) => {
                info!("Completion was recorded despite the store error");
                JobResult::success(&ctx.job, artifact_path)
            }
            Ok(Delivery::Recorded) => {
                self.remove_artifacts(&ctx.job.id).await;
                JobResult::failure(&ctx.job, error)
            }
            Ok(Delivery::Discarded) | Ok(Delivery::Rejected { .. }) => {
                self.remove_artifacts(&ctx.job.id).await;
                JobResult::discarded(&ctx.job)
            }
            Err(e) => {
                error!("Failed to record job failure: {}", e);
                JobResult::failure(&ctx.job, error)
            }
        }
    }

    async fn fail(
        &self,
        ctx: &PipelineContext,
        error: String,
        progress: &dyn ProgressReporter,
    ) -> JobResult {
        warn!("Conversion failed: {}", error);
        self.remove_artifacts(&ctx.job.id).await;

        match progress.report(ProgressEvent::Failed {
            error: error.clone(),
        }) {
            Ok(Delivery::Recorded) => JobResult::failure(&ctx.job, error),
            Ok(Delivery::Discarded) | Ok(Delivery::Rejected { .. }) => {
                JobResult::discarded(&ctx.job)
            }
            Err(e) => {
                error!("Failed to record job failure: {}", e);
                JobResult::failure(&ctx.job, error)
            }
        }
    }

    async fn remove_artifacts(&self, job_id: &str) {
        let dir = self.config.artifact_dir_for(job_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed artifact directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove artifact directory {}: {}",
                dir.display(),
                e
            ),
        }
    }
}

async fn release_staging(ctx: &mut PipelineContext) {
    let Some(mut staging) = ctx.staging.take() else {
        return;
    };
    match tokio::task::spawn_blocking(move || staging.teardown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to remove staging directory: {}", e),
        Err(e) => warn!("Staging cleanup task failed: {}", e),
    }
}
