use std::path::PathBuf;

use crate::config::schema::{CompilerConfig, PackagerConfig};
use crate::config::Config;

pub struct PipelineConfig {
    pub staging_directory: PathBuf,
    pub artifact_directory: PathBuf,
    pub compiler: CompilerConfig,
    pub packager: PackagerConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            staging_directory: config.staging_directory.clone(),
            artifact_directory: config.artifact_directory.clone(),
            compiler: config.compiler.clone(),
            packager: config.packager.clone(),
        }
    }

    /// Directory holding the artifact of one job. Removing it removes
    /// everything the pipeline wrote for that job.
    pub fn artifact_dir_for(&self, job_id: &str) -> PathBuf {
        self.artifact_directory.join(job_id)
    }
}
