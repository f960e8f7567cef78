use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration. Every field has a default, so `{"version": "1.0"}`
/// is a complete config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_staging_directory")]
    pub staging_directory: PathBuf,
    #[serde(default = "default_artifact_directory")]
    pub artifact_directory: PathBuf,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_max_concurrent_pipelines")]
    pub max_concurrent_pipelines: usize,
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub packager: PackagerConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_staging_directory() -> PathBuf {
    std::env::temp_dir().join("ts2sh_uploads")
}

fn default_artifact_directory() -> PathBuf {
    std::env::temp_dir().join("ts2sh_outputs")
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path().unwrap_or_else(|| PathBuf::from("ts2sh.db"))
}

fn default_max_concurrent_pipelines() -> usize {
    num_cpus::get().max(1)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            staging_directory: default_staging_directory(),
            artifact_directory: default_artifact_directory(),
            database_path: default_database_path(),
            max_concurrent_pipelines: default_max_concurrent_pipelines(),
            compiler: CompilerConfig::default(),
            packager: PackagerConfig::default(),
        }
    }
}

/// How the external compiler is invoked.
///
/// `args` may contain the placeholders `{project}` (path of the staged
/// `tsconfig.json`), `{src}` and `{out}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default = "default_compiler_program")]
    pub program: String,
    #[serde(default = "default_compiler_args")]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub install_dependencies: bool,
    #[serde(default = "default_install_program")]
    pub install_program: String,
    #[serde(default = "default_install_args")]
    pub install_args: Vec<String>,
}

fn default_compiler_program() -> String {
    "tsc".to_string()
}

fn default_compiler_args() -> Vec<String> {
    vec![
        "--project".to_string(),
        "{project}".to_string(),
        "--outDir".to_string(),
        "{out}".to_string(),
    ]
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

fn default_install_program() -> String {
    "npm".to_string()
}

fn default_install_args() -> Vec<String> {
    vec!["install".to_string()]
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: default_compiler_program(),
            args: default_compiler_args(),
            timeout_secs: default_timeout_secs(),
            install_dependencies: true,
            install_program: default_install_program(),
            install_args: default_install_args(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagerConfig {
    /// Interpreter the generated script runs the entry file with.
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Entry files tried, in order, at the root of the compiled tree.
    #[serde(default = "default_entry_candidates")]
    pub entry_candidates: Vec<String>,
    /// Largest single file that may be embedded.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_runtime() -> String {
    "node".to_string()
}

fn default_entry_candidates() -> Vec<String> {
    vec![
        "index.js".to_string(),
        "main.js".to_string(),
        "app.js".to_string(),
    ]
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            entry_candidates: default_entry_candidates(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}
