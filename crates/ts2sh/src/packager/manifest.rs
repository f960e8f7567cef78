//! Manifest of the files embedded in an artifact.
//!
//! One line per file: `<byte length> <sha256 hex> <relative path>`, paths
//! `/`-separated and sorted bytewise.

use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::PackageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub len: u64,
    pub sha256: String,
}

impl ManifestEntry {
    pub fn for_content(path: impl Into<String>, content: &[u8]) -> Self {
        Self {
            path: path.into(),
            len: content.len() as u64,
            sha256: sha256_hex(content),
        }
    }

    pub fn to_line(&self) -> String {
        format!("{} {} {}", self.len, self.sha256, self.path)
    }

    /// Parses a line produced by [`ManifestEntry::to_line`].
    pub fn parse_line(line: &str) -> Option<Self> {
        let (len, rest) = line.split_once(' ')?;
        let (sha256, path) = rest.split_once(' ')?;
        if sha256.len() != 64 || !sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        if path.is_empty() {
            return None;
        }
        Some(Self {
            path: path.to_string(),
            len: len.parse().ok()?,
            sha256: sha256.to_string(),
        })
    }
}

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

fn unsupported(path: &str, reason: &str) -> PackageError {
    PackageError::UnsupportedPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Checks that a relative path survives a round trip through a manifest line
/// and the extraction script.
pub fn check_manifest_path(path: &str) -> Result<(), PackageError> {
    for segment in path.split('/') {
        if segment.is_empty() {
            return Err(unsupported(path, "empty path segment"));
        }
        if segment.chars().any(char::is_control) {
            return Err(unsupported(path, "control character in file name"));
        }
        if segment.trim() != segment {
            return Err(unsupported(
                path,
                "leading or trailing whitespace in file name",
            ));
        }
    }
    Ok(())
}

/// Reads every regular file under `root` into memory, in manifest order.
pub fn collect_files(
    root: &Path,
    max_file_bytes: u64,
) -> Result<Vec<(ManifestEntry, Vec<u8>)>, PackageError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            PackageError::Io {
                path,
                source: std::io::Error::from(e),
            }
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        if !entry.file_type().is_file() {
            log::warn!(
                "Skipping non-regular file in compiled output: {}",
                entry.path().display()
            );
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| unsupported(&entry.path().to_string_lossy(), "outside output tree"))?;
        let mut segments = Vec::new();
        for component in relative.components() {
            let segment = component
                .as_os_str()
                .to_str()
                .ok_or_else(|| unsupported(&relative.to_string_lossy(), "not valid UTF-8"))?;
            segments.push(segment);
        }
        let path = segments.join("/");
        check_manifest_path(&path)?;

        let size = entry
            .metadata()
            .map_err(|e| PackageError::Io {
                path: entry.path().to_path_buf(),
                source: std::io::Error::from(e),
            })?
            .len();
        if size > max_file_bytes {
            return Err(PackageError::ArtifactTooLarge {
                path,
                size,
                limit: max_file_bytes,
            });
        }

        let content = std::fs::read(entry.path()).map_err(|e| PackageError::Io {
            path: entry.path().to_path_buf(),
            source: e,
        })?;
        // The file may have grown since the metadata call.
        if content.len() as u64 > max_file_bytes {
            return Err(PackageError::ArtifactTooLarge {
                path,
                size: content.len() as u64,
                limit: max_file_bytes,
            });
        }

        files.push((ManifestEntry::for_content(path, &content), content));
    }

    if files.is_empty() {
        return Err(PackageError::EmptyArtifact);
    }

    files.sort_by(|a, b| a.0.path.cmp(&b.0.path));
    Ok(files)
}
