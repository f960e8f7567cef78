//! Test harness for isolated test execution.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use ts2sh::config::Config;
use ts2sh::db::Database;
use ts2sh::{Job, JobStatus, JobStore, Orchestrator};

use super::builders::ConfigBuilder;
use super::fake_compiler::FakeCompiler;

/// An orchestrator over temp directories and an in-memory database.
pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub compiler: FakeCompiler,
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_compiler(FakeCompiler::new())
    }

    pub fn with_compiler(compiler: FakeCompiler) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = ConfigBuilder::new(temp_dir.path()).build();
        Self::build(temp_dir, config, compiler)
    }

    /// `configure` receives a builder already rooted in the harness directory.
    pub fn with_config(
        compiler: FakeCompiler,
        configure: impl FnOnce(ConfigBuilder) -> ConfigBuilder,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = configure(ConfigBuilder::new(temp_dir.path())).build();
        Self::build(temp_dir, config, compiler)
    }

    fn build(temp_dir: TempDir, config: Config, compiler: FakeCompiler) -> Self {
        let store = JobStore::new(Database::open_in_memory().expect("Failed to open database"));
        let orchestrator =
            Orchestrator::with_compiler(&config, store, Arc::new(compiler.clone()));
        Self {
            temp_dir,
            config,
            compiler,
            orchestrator,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn artifact_dir_for(&self, job_id: &str) -> PathBuf {
        self.config.artifact_directory.join(job_id)
    }

    /// Number of staging directories still on disk.
    pub fn staging_leftovers(&self) -> usize {
        match std::fs::read_dir(&self.config.staging_directory) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    pub async fn wait_terminal(&self, job_id: &str) -> Job {
        tokio::time::timeout(
            Duration::from_secs(20),
            self.orchestrator
                .wait_for_terminal(job_id, Duration::from_millis(10)),
        )
        .await
        .expect("job did not finish in time")
        .expect("job lookup failed")
    }

    pub async fn wait_status(&self, job_id: &str, status: JobStatus) -> Job {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
        loop {
            let job = self.orchestrator.get(job_id).expect("job lookup failed");
            if job.status == status {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} never reached {}, last seen {}",
                job_id,
                status,
                job.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Waits until the fake compiler has been entered `n` times.
    pub async fn wait_compiles(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
        while self.compiler.calls() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "compiler entered {} times, expected {}",
                self.compiler.calls(),
                n
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(20), self.orchestrator.wait_idle())
            .await
            .expect("pipelines did not drain in time");
    }
}
