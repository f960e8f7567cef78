//! Pass-through of non-TypeScript files from the source tree to the output.

use std::path::Path;

use walkdir::WalkDir;

use super::tsconfig::TSCONFIG_FILE;
use super::CompileError;

fn io_error(path: &Path, source: std::io::Error) -> CompileError {
    CompileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts"];

fn is_typescript_source(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SOURCE_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

/// Copies every file under `src` that the compiler does not consume into the
/// same relative location under `out`. `node_modules/` is skipped and files
/// the compiler already produced are left alone. Returns the number copied.
pub fn copy_passthrough_assets(src: &Path, out: &Path) -> Result<usize, CompileError> {
    let mut copied = 0;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == "node_modules"));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            io_error(&path, std::io::Error::from(e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = match path.strip_prefix(src) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if is_typescript_source(path) || relative == Path::new(TSCONFIG_FILE) {
            continue;
        }

        let target = out.join(relative);
        if target.exists() {
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        std::fs::copy(path, &target).map_err(|e| io_error(path, e))?;
        copied += 1;
    }

    Ok(copied)
}
