use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info_span, warn, Instrument};

use crate::config::CompilerConfig;
use crate::staging::StagingArea;

use super::assets::copy_passthrough_assets;
use super::tsconfig::ensure_tsconfig;
use super::{CompileError, CompiledTree, Compiler};

/// Formats compiler diagnostics: stderr first, then stdout, each trimmed.
fn format_diagnostics(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => match output.status.code() {
            Some(code) => format!("Compiler exited with status {}", code),
            None => "Compiler was terminated by a signal".to_string(),
        },
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

/// Kills a child's process group on drop unless disarmed.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    id: Option<u32>,
}

impl ProcessGroup {
    fn disarm(mut self) {
        self.id = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.id.take() {
            // SAFETY: killpg takes plain integers and touches no memory.
            let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
            if rc != 0 {
                debug!(pgid, "Compiler process group already gone");
            }
        }
    }
}

/// Runs an external compiler (by default `tsc`) as a subprocess.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    config: CompilerConfig,
}

impl CommandCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn expand_args(&self, project: &Path, src: &Path, out: &Path) -> Vec<String> {
        let project = project.to_string_lossy();
        let src = src.to_string_lossy();
        let out = out.to_string_lossy();
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{project}", &project)
                    .replace("{src}", &src)
                    .replace("{out}", &out)
            })
            .collect()
    }

    /// Runs `program args` in `cwd` with the configured timeout. The child
    /// gets its own process group, and the whole group is killed if the wait
    /// times out or is abandoned.
    async fn run(&self, program: &str, args: &[String], cwd: &Path) -> Result<Output, CompileError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| CompileError::Spawn {
            program: program.to_string(),
            source: e,
        })?;
        let group = ProcessGroup { id: child.id() };

        match tokio::time::timeout(self.timeout(), child.wait_with_output()).await {
            Ok(Ok(output)) => {
                group.disarm();
                Ok(output)
            }
            Ok(Err(e)) => Err(CompileError::Spawn {
                program: program.to_string(),
                source: e,
            }),
            Err(_) => Err(CompileError::Timeout {
                seconds: self.config.timeout_secs,
            }),
        }
    }

    /// Best effort: an install failure is logged and compilation proceeds.
    async fn install_dependencies(&self, src: &Path) {
        if !self.config.install_dependencies || !src.join("package.json").is_file() {
            return;
        }

        let program = &self.config.install_program;
        debug!(program = %program, "Installing dependencies");
        match self.run(program, &self.config.install_args, src).await {
            Ok(output) if output.status.success() => {
                debug!("Dependency installation finished");
            }
            Ok(output) => {
                warn!(
                    "Dependency installation failed, continuing: {}",
                    format_diagnostics(&output)
                );
            }
            Err(e) => {
                warn!("Dependency installation failed, continuing: {}", e);
            }
        }
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(&self, staging: &StagingArea) -> Result<CompiledTree, CompileError> {
        let src = staging.src_dir();
        let out = staging.out_dir();
        let span = info_span!("compiler.command", program = %self.config.program);

        async move {
            let (project, written) = ensure_tsconfig(&src).map_err(|e| CompileError::Io {
                path: src.join("tsconfig.json"),
                source: e,
            })?;
            if written {
                debug!("No tsconfig.json supplied, using defaults");
            }

            self.install_dependencies(&src).await;

            let args = self.expand_args(&project, &src, &out);
            let output = self.run(&self.config.program, &args, &src).await?;
            if !output.status.success() {
                return Err(CompileError::Failed {
                    diagnostics: format_diagnostics(&output),
                });
            }

            let passthrough_assets = copy_passthrough_assets(&src, &out)?;
            debug!(passthrough_assets, "Compilation succeeded");

            Ok(CompiledTree {
                root: out,
                passthrough_assets,
            })
        }
        .instrument(span)
        .await
    }
}
