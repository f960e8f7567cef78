//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use std::path::Path;

use ts2sh::config::schema::{CompilerConfig, Config, PackagerConfig};
use ts2sh::SourceFile;

/// Builder for creating `Config` instances rooted in a test directory.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(root: &Path) -> Self {
        Self {
            config: Config {
                staging_directory: root.join("staging"),
                artifact_directory: root.join("artifacts"),
                database_path: root.join("ts2sh.db"),
                max_concurrent_pipelines: 2,
                ..Config::default()
            },
        }
    }

    pub fn max_concurrent_pipelines(mut self, n: usize) -> Self {
        self.config.max_concurrent_pipelines = n;
        self
    }

    pub fn runtime(mut self, runtime: &str) -> Self {
        self.config.packager = PackagerConfig {
            runtime: runtime.to_string(),
            ..self.config.packager
        };
        self
    }

    pub fn compiler(mut self, compiler: CompilerConfig) -> Self {
        self.config.compiler = compiler;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Source files from `(path, content)` pairs.
pub fn sources(files: &[(&str, &str)]) -> Vec<SourceFile> {
    files
        .iter()
        .map(|(path, content)| SourceFile::new(*path, *content))
        .collect()
}

/// The single-file project most tests convert.
pub fn demo_sources() -> Vec<SourceFile> {
    sources(&[("index.ts", "console.log('Hello from demo');\n")])
}
