//! Compiler invocation.
//!
//! [`Compiler`] turns a staged source tree into an output tree or fails.
//! [`CommandCompiler`] is the subprocess implementation; tests and embedders
//! can provide their own.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::staging::StagingArea;

pub mod assets;
pub mod command;
pub mod tsconfig;

pub use command::CommandCompiler;

#[derive(Error, Debug)]
pub enum CompileError {
    /// The compiler exited nonzero. Carries its diagnostics verbatim.
    #[error("{diagnostics}")]
    Failed { diagnostics: String },

    #[error("Compilation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare compiler input '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A successfully compiled tree, ready for packaging.
#[derive(Debug, Clone)]
pub struct CompiledTree {
    pub root: PathBuf,
    /// Files copied unchanged from the sources.
    pub passthrough_assets: usize,
}

#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compiles `staging.src_dir()` into `staging.out_dir()`.
    async fn compile(&self, staging: &StagingArea) -> Result<CompiledTree, CompileError>;
}
