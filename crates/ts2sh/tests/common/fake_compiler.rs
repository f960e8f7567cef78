//! A scriptable `Compiler` that needs no toolchain.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use walkdir::WalkDir;

use ts2sh::{CompileError, CompiledTree, Compiler, StagingArea};

/// "Compiles" by copying every `.ts` file to a `.js` file at the same
/// relative path. Can be told to fail, to sleep, or to wait for a permit.
#[derive(Clone, Default)]
pub struct FakeCompiler {
    diagnostics: Option<String>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl FakeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every compilation fails with these diagnostics.
    pub fn failing(diagnostics: &str) -> Self {
        Self {
            diagnostics: Some(diagnostics.to_string()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Compilations block until [`FakeCompiler::release`] hands out permits.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn transpile(src: &Path, out: &Path) -> Result<(), CompileError> {
        for entry in WalkDir::new(src).min_depth(1) {
            let entry = entry.map_err(|e| CompileError::Io {
                path: src.to_path_buf(),
                source: e.into(),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("ts") {
                continue;
            }
            let relative = path.strip_prefix(src).unwrap().with_extension("js");
            let target = out.join(relative);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::copy(path, &target).map_err(|e| CompileError::Io {
                path: target.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(&self, staging: &StagingArea) -> Result<CompiledTree, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match &self.diagnostics {
            Some(diagnostics) => Err(CompileError::Failed {
                diagnostics: diagnostics.clone(),
            }),
            None => Self::transpile(&staging.src_dir(), &staging.out_dir()).map(|_| CompiledTree {
                root: staging.out_dir(),
                passthrough_assets: 0,
            }),
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
