//! Helpers for turning untrusted text (project names, paths) into values
//! that are safe for span attributes, file names and generated shell code.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// File name of the packaged script for a project.
///
/// - `demo` → `demo.sh`
/// - `my app/v2` → `my_app_v2.sh`
/// - `..` → `project.sh`
pub fn artifact_file_name(project_name: &str) -> String {
    let mapped: String = project_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let stem = mapped.trim_matches('.');
    if stem.is_empty() || stem.chars().all(|c| c == '_') {
        "project.sh".to_string()
    } else {
        format!("{}.sh", stem)
    }
}

/// Wraps a value in single quotes for POSIX shells.
///
/// Embedded single quotes become `'\''`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Flattens text for a single-line shell comment: control characters
/// (including newlines) become spaces.
pub fn comment_text(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}
