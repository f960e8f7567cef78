//! Packaging of a compiled output tree into a single self-extracting script.

pub mod manifest;
pub mod script;
pub mod verify;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info_span};

use crate::config::PackagerConfig;

use manifest::{collect_files, ManifestEntry};
use script::{render, ScriptParts};

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("the compiled output contains no files")]
    EmptyArtifact,

    #[error("'{path}' is {size} bytes, over the {limit} byte limit")]
    ArtifactTooLarge { path: String, size: u64, limit: u64 },

    #[error("artifact failed verification: {detail}")]
    PackageCorruption { detail: String },

    #[error("No JavaScript files found in compiled output")]
    NoEntryPoint,

    #[error("'{path}' cannot be packaged: {reason}")]
    UnsupportedPath { path: String, reason: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A verified script together with what went into it.
#[derive(Debug, Clone)]
pub struct PackagedArtifact {
    pub script: String,
    pub manifest: Vec<ManifestEntry>,
    pub entry_point: String,
}

/// Chooses the file the script hands to the runtime: the first configured
/// candidate present at the top level, otherwise the first top-level `.js`
/// file in manifest order.
pub fn select_entry_point(
    candidates: &[String],
    manifest: &[ManifestEntry],
) -> Result<String, PackageError> {
    for candidate in candidates {
        if manifest.iter().any(|e| &e.path == candidate) {
            return Ok(candidate.clone());
        }
    }
    manifest
        .iter()
        .map(|e| e.path.as_str())
        .find(|p| !p.contains('/') && p.ends_with(".js"))
        .map(str::to_string)
        .ok_or(PackageError::NoEntryPoint)
}

#[derive(Debug, Clone)]
pub struct Packager {
    config: PackagerConfig,
}

impl Packager {
    pub fn new(config: PackagerConfig) -> Self {
        Self { config }
    }

    /// Packages every file under `root`. The rendered script is read back and
    /// checked against the collected files before it is returned.
    pub fn package(
        &self,
        root: &Path,
        project_name: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<PackagedArtifact, PackageError> {
        let _span = info_span!("packager.package", root = %root.display()).entered();

        let files = collect_files(root, self.config.max_file_bytes)?;
        let manifest: Vec<ManifestEntry> = files.iter().map(|(e, _)| e.clone()).collect();
        let entry_point = select_entry_point(&self.config.entry_candidates, &manifest)?;

        let script = render(&ScriptParts {
            project_name,
            entry_point: &entry_point,
            runtime: &self.config.runtime,
            generated_at,
            files: &files,
        });
        verify::verify(&script, &files)?;

        debug!(
            files = manifest.len(),
            bytes = script.len(),
            entry = %entry_point,
            "Artifact packaged"
        );

        Ok(PackagedArtifact {
            script,
            manifest,
            entry_point,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn entries(paths: &[&str]) -> Vec<ManifestEntry> {
        paths
            .iter()
            .map(|p| ManifestEntry::for_content(*p, b""))
            .collect()
    }

    fn candidates() -> Vec<String> {
        PackagerConfig::default().entry_candidates
    }

    #[test]
    fn test_entry_prefers_candidates_in_order() {
        let manifest = entries(&["app.js", "index.js", "main.js"]);
        assert_eq!(select_entry_point(&candidates(), &manifest).unwrap(), "index.js");

        let manifest = entries(&["app.js", "main.js"]);
        assert_eq!(select_entry_point(&candidates(), &manifest).unwrap(), "main.js");
    }

    #[test]
    fn test_entry_falls_back_to_first_top_level_js() {
        let manifest = entries(&["a/index.js", "cli.js", "zeta.js"]);
        assert_eq!(select_entry_point(&candidates(), &manifest).unwrap(), "cli.js");
    }

    #[test]
    fn test_nested_candidate_does_not_count() {
        let manifest = entries(&["lib/index.js", "readme.md"]);
        assert!(matches!(
            select_entry_point(&candidates(), &manifest),
            Err(PackageError::NoEntryPoint)
        ));
    }

    #[test]
    fn test_no_entry_message() {
        assert_eq!(
            PackageError::NoEntryPoint.to_string(),
            "No JavaScript files found in compiled output"
        );
    }

    #[test]
    fn test_package_produces_verified_script() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.js", b"console.log('hi');\n");
        write(dir.path(), "lib/util.js", b"module.exports = 1;\n");

        let packager = Packager::new(PackagerConfig::default());
        let artifact = packager.package(dir.path(), "demo", Utc::now()).unwrap();

        assert_eq!(artifact.entry_point, "index.js");
        assert_eq!(artifact.manifest.len(), 2);
        assert!(artifact.script.starts_with("#!/usr/bin/env bash\n"));
        let restored = verify::read_artifact(&artifact.script).unwrap();
        assert_eq!(restored[1].1, b"module.exports = 1;\n");
    }

    #[test]
    fn test_package_without_js_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.txt", b"nothing to run");

        let packager = Packager::new(PackagerConfig::default());
        assert!(matches!(
            packager.package(dir.path(), "demo", Utc::now()),
            Err(PackageError::NoEntryPoint)
        ));
    }

    #[cfg(unix)]
    mod execution {
        use super::*;
        use std::process::Command;

        use crate::packager::script::CORRUPTION_EXIT_CODE;

        /// Packages a tree whose "runtime" is bash so the script can run
        /// without node installed.
        fn package_with_bash(files: &[(&str, &[u8])]) -> PackagedArtifact {
            let dir = tempfile::tempdir().unwrap();
            for (path, content) in files {
                write(dir.path(), path, content);
            }
            let packager = Packager::new(PackagerConfig {
                runtime: "bash".to_string(),
                ..PackagerConfig::default()
            });
            packager.package(dir.path(), "demo", Utc::now()).unwrap()
        }

        fn install(script: &str, dir: &Path) -> PathBuf {
            let path = dir.join("demo.sh");
            std::fs::write(&path, script).unwrap();
            path
        }

        fn leftovers(tmp: &Path) -> usize {
            std::fs::read_dir(tmp).unwrap().count()
        }

        #[test]
        fn test_script_runs_entry_with_arguments() {
            let artifact = package_with_bash(&[
                (
                    "index.js",
                    b"dir=$(dirname \"$0\")\ncat \"$dir/lib/msg.txt\"\necho \"args: $*\"\nexit 4\n",
                ),
                ("lib/msg.txt", b"hello from payload\n"),
            ]);
            let work = tempfile::tempdir().unwrap();
            let tmp = tempfile::tempdir().unwrap();
            let script = install(&artifact.script, work.path());

            let output = Command::new("bash")
                .arg(&script)
                .args(["one", "two"])
                .env("TMPDIR", tmp.path())
                .current_dir(work.path())
                .output()
                .unwrap();

            let stdout = String::from_utf8_lossy(&output.stdout);
            assert_eq!(stdout, "hello from payload\nargs: one two\n");
            assert_eq!(output.status.code(), Some(4));
            assert!(String::from_utf8_lossy(&output.stderr).contains("Running demo..."));
            assert_eq!(leftovers(tmp.path()), 0);
        }

        #[test]
        fn test_script_restores_binary_files_exactly() {
            let blob: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
            let artifact = package_with_bash(&[
                ("index.js", b"cat \"$(dirname \"$0\")/blob.bin\"\n"),
                ("blob.bin", &blob),
            ]);
            let work = tempfile::tempdir().unwrap();
            let tmp = tempfile::tempdir().unwrap();
            let script = install(&artifact.script, work.path());

            let output = Command::new("bash")
                .arg(&script)
                .env("TMPDIR", tmp.path())
                .output()
                .unwrap();

            assert!(output.status.success());
            assert_eq!(output.stdout, blob);
        }

        #[test]
        fn test_tampered_script_exits_with_corruption_code() {
            let artifact = package_with_bash(&[("index.js", b"echo should not run\n")]);
            let marker = format!("{} 0\n", script::ENTRY_MARKER);
            let at = artifact.script.find(&marker).unwrap() + marker.len();
            let mut tampered = artifact.script.clone();
            let replacement = if &tampered[at..at + 1] == "Z" { "Y" } else { "Z" };
            tampered.replace_range(at..at + 1, replacement);

            let work = tempfile::tempdir().unwrap();
            let tmp = tempfile::tempdir().unwrap();
            let script = install(&tampered, work.path());
            let output = Command::new("bash")
                .arg(&script)
                .env("TMPDIR", tmp.path())
                .output()
                .unwrap();

            assert_eq!(output.status.code(), Some(CORRUPTION_EXIT_CODE));
            assert!(output.stdout.is_empty());
            assert!(String::from_utf8_lossy(&output.stderr).contains("PackageCorruption"));
            assert_eq!(leftovers(tmp.path()), 0);
        }

        #[test]
        fn test_missing_runtime_exits_127() {
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "index.js", b"echo hi\n");
            let packager = Packager::new(PackagerConfig {
                runtime: "ts2sh-no-such-runtime".to_string(),
                ..PackagerConfig::default()
            });
            let artifact = packager.package(dir.path(), "demo", Utc::now()).unwrap();

            let work = tempfile::tempdir().unwrap();
            let script = install(&artifact.script, work.path());
            let output = Command::new("bash").arg(&script).output().unwrap();

            assert_eq!(output.status.code(), Some(127));
            assert!(String::from_utf8_lossy(&output.stderr).contains("ts2sh-no-such-runtime"));
        }
    }
}
