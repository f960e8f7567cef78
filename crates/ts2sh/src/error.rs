use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobStatus;

/// Errors returned synchronously at the orchestrator boundary.
///
/// None of these touch a job's state: pipeline failures are recorded on the
/// job itself (see [`crate::pipeline::PipelineError`]).
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Shutting down, no new jobs are accepted")]
    ShuttingDown,

    #[error("Artifact for job {job_id} is not ready (job is {status})")]
    ArtifactNotReady { job_id: String, status: JobStatus },

    #[error("Job store error: {0}")]
    Store(#[from] crate::db::DatabaseError),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

pub type Result<T> = std::result::Result<T, ConvertError>;
