use std::path::PathBuf;

use thiserror::Error;

use crate::compiler::CompileError;
use crate::packager::PackageError;
use crate::staging::StagingError;

/// Error recorded on jobs cut short by a shutdown or a process exit.
pub const INTERRUPTED_MESSAGE: &str = "interrupted before completion";

/// A stage failure. Its Display text becomes the job's `error_message`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Staging failed: {0}")]
    Staging(#[from] StagingError),

    /// Compiler diagnostics are shown as-is.
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Packaging failed: {0}")]
    Package(#[from] PackageError),

    #[error("Failed to write artifact '{path}': {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pipeline task failed: {0}")]
    Task(String),

    #[error("{}", INTERRUPTED_MESSAGE)]
    Interrupted,
}
