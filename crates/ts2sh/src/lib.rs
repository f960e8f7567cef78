pub mod broadcast;
pub mod compiler;
pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod packager;
pub mod pipeline;
pub mod sanitize;
pub mod sources;
pub mod staging;
pub mod store;
pub mod worker;

pub use broadcast::{JobEvent, JobEventBroadcaster};
pub use compiler::{CommandCompiler, CompileError, CompiledTree, Compiler};
pub use config::{load_config, load_config_or_default, Config};
pub use error::{ConfigError, ConvertError, Result};
pub use job::{Checkpoint, Job, JobStatus, SourceEntry, SourceFile};
pub use orchestrator::{Artifact, Orchestrator, RecoveryReport, INTERRUPTED_MESSAGE};
pub use packager::{PackageError, PackagedArtifact, Packager};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext, PipelineError};
pub use staging::{StagingArea, StagingError};
pub use store::{JobStore, WriteOutcome};
