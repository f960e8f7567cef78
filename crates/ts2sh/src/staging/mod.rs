//! Per-job staging directories.
//!
//! A [`StagingArea`] owns a fresh directory under the configured staging root
//! with two children: `src/` holding the submitted files and `out/` for the
//! compiler's output. The directory is removed by [`StagingArea::teardown`]
//! or, failing that, when the value is dropped.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;

use crate::job::SourceFile;
use crate::sanitize::redact_path;

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Path '{path}' escapes the staging directory")]
    PathEscape { path: String },

    #[error("Duplicate path '{path}'")]
    DuplicatePath { path: String },

    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Validates a submitted relative path and returns it as a native relative
/// path. Both `/` and `\` are treated as separators.
pub fn validate_relative_path(path: &str) -> Result<PathBuf, StagingError> {
    let invalid = |reason: &str| StagingError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.trim().is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.contains('\0') {
        return Err(invalid("path contains a NUL byte"));
    }

    let normalized = path.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(invalid("absolute paths are not allowed"));
    }

    let mut relative = PathBuf::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(StagingError::PathEscape {
                    path: path.to_string(),
                })
            }
            other => {
                // Catches drive prefixes such as `C:` on Windows.
                let mut components = Path::new(other).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => relative.push(other),
                    _ => return Err(invalid("path has a root or drive prefix")),
                }
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(invalid("path names no file"));
    }

    Ok(relative)
}

pub struct StagingArea {
    dir: Option<TempDir>,
    root: PathBuf,
}

impl std::fmt::Debug for StagingArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingArea")
            .field("root", &self.root)
            .field("active", &self.dir.is_some())
            .finish()
    }
}

impl StagingArea {
    /// Creates a fresh directory under `staging_root` and writes `files` into
    /// its `src/` child. Every path is validated before anything is written.
    pub fn create(
        staging_root: &Path,
        job_id: &str,
        files: &[SourceFile],
    ) -> Result<Self, StagingError> {
        let _span = tracing::info_span!(
            "staging.create",
            staging_root = %redact_path(staging_root),
            files = files.len()
        )
        .entered();

        let mut seen = HashSet::new();
        let mut planned = Vec::with_capacity(files.len());
        for file in files {
            let relative = validate_relative_path(&file.path)?;
            if !seen.insert(relative.clone()) {
                return Err(StagingError::DuplicatePath {
                    path: file.path.clone(),
                });
            }
            planned.push((relative, &file.content));
        }

        std::fs::create_dir_all(staging_root).map_err(|e| StagingError::Io {
            path: staging_root.to_path_buf(),
            source: e,
        })?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", job_id))
            .tempdir_in(staging_root)
            .map_err(|e| StagingError::Io {
                path: staging_root.to_path_buf(),
                source: e,
            })?;
        let root = dir.path().to_path_buf();
        let area = Self {
            dir: Some(dir),
            root,
        };

        let src = area.src_dir();
        let out = area.out_dir();
        for dir in [&src, &out] {
            std::fs::create_dir_all(dir).map_err(|e| StagingError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }

        for (relative, content) in planned {
            let target = src.join(&relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| StagingError::Io {
                    path: relative.clone(),
                    source: e,
                })?;
            }
            std::fs::write(&target, content).map_err(|e| StagingError::Io {
                path: relative.clone(),
                source: e,
            })?;
        }

        tracing::debug!(root = %area.root.display(), "Staging area ready");
        Ok(area)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where submitted files live.
    pub fn src_dir(&self) -> PathBuf {
        self.root.join("src")
    }

    /// Where the compiler writes its output.
    pub fn out_dir(&self) -> PathBuf {
        self.root.join("out")
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.dir.is_some()
    }

    /// Removes the staging directory. Safe to call more than once.
    pub fn teardown(&mut self) -> Result<(), StagingError> {
        if let Some(dir) = self.dir.take() {
            dir.close().map_err(|e| StagingError::Io {
                path: self.root.clone(),
                source: e,
            })?;
            tracing::debug!(root = %self.root.display(), "Staging area removed");
        }
        Ok(())
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            log::warn!("Failed to clean up staging area: {}", e);
        }
    }
}
