//! Gathering source files from the local filesystem for a submission.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::{ConvertError, Result};
use crate::job::SourceFile;

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| name == "node_modules" || name.starts_with('.'))
            .unwrap_or(false)
}

fn read_file(path: &Path, relative: String) -> Result<SourceFile> {
    let content = std::fs::read(path).map_err(|e| ConvertError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(SourceFile::new(relative, content))
}

fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut segments = Vec::new();
    for component in relative.components() {
        let segment = component.as_os_str().to_str().ok_or_else(|| {
            ConvertError::InvalidRequest(format!(
                "'{}' is not a valid UTF-8 path",
                path.display()
            ))
        })?;
        segments.push(segment);
    }
    Ok(segments.join("/"))
}

/// Reads the given files and directories into submission order.
///
/// A file is stored under its own name. A directory contributes every file
/// beneath it, named relative to the directory, skipping `node_modules` and
/// dot-directories.
pub fn collect_sources(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();

    for path in paths {
        let metadata = std::fs::metadata(path).map_err(|e| ConvertError::Io {
            path: path.clone(),
            source: e,
        })?;

        if metadata.is_file() {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    ConvertError::InvalidRequest(format!(
                        "'{}' has no usable file name",
                        path.display()
                    ))
                })?;
            files.push(read_file(path, name.to_string())?);
            continue;
        }

        let walker = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e));
        for entry in walker {
            let entry = entry.map_err(|e| {
                let at = e.path().unwrap_or(path).to_path_buf();
                ConvertError::Io {
                    path: at,
                    source: std::io::Error::from(e),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = relative_name(path, entry.path())?;
            files.push(read_file(entry.path(), relative)?);
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_directory_is_walked_relative_to_itself() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.ts", "a");
        write(dir.path(), "lib/util.ts", "b");
        write(dir.path(), "node_modules/dep/index.js", "c");
        write(dir.path(), ".git/config", "d");

        let files = collect_sources(&[dir.path().to_path_buf()]).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();

        assert_eq!(paths, vec!["index.ts", "lib/util.ts"]);
        assert_eq!(files[1].content, b"b");
        assert_eq!(files[1].size, 1);
    }

    #[test]
    fn test_single_file_uses_its_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "nested/main.ts", "x");

        let files = collect_sources(&[dir.path().join("nested/main.ts")]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "main.ts");
    }

    #[test]
    fn test_missing_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_sources(&[dir.path().join("absent")]).unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
    }
}
