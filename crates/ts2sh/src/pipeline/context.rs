use std::path::PathBuf;

use crate::compiler::CompiledTree;
use crate::job::{Job, SourceFile};
use crate::packager::PackagedArtifact;
use crate::staging::StagingArea;

pub struct PipelineContext {
    // Input
    pub job: Job,
    /// Submitted files with content; emptied once staged.
    pub sources: Vec<SourceFile>,

    // Step 1 result, removed from disk when the context is released
    pub staging: Option<StagingArea>,

    // Step 2 result
    pub compiled: Option<CompiledTree>,

    // Step 3 result
    pub packaged: Option<PackagedArtifact>,

    // Step 4 result
    pub artifact_path: Option<PathBuf>,
}

impl PipelineContext {
    pub fn new(job: Job, sources: Vec<SourceFile>) -> Self {
        Self {
            job,
            sources,
            staging: None,
            compiled: None,
            packaged: None,
            artifact_path: None,
        }
    }
}
