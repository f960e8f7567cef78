//! Reading an assembled script back into files, the in-memory counterpart of
//! the script's own extraction routine.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::manifest::{sha256_hex, ManifestEntry};
use super::script::{ENTRY_MARKER, MANIFEST_END, MANIFEST_START, PAYLOAD_END, PAYLOAD_START};
use super::PackageError;

fn corruption(detail: impl Into<String>) -> PackageError {
    PackageError::PackageCorruption {
        detail: detail.into(),
    }
}

/// Returns the lines strictly between the whole-line markers `start` and `end`.
fn section<'a>(script: &'a str, start: &str, end: &str) -> Result<Vec<&'a str>, PackageError> {
    let mut lines = script.lines().skip_while(|l| *l != start);
    if lines.next().is_none() {
        return Err(corruption(format!("section start '{}' not found", start)));
    }
    let mut body = Vec::new();
    for line in lines {
        if line == end {
            return Ok(body);
        }
        body.push(line);
    }
    Err(corruption(format!("section end '{}' not found", end)))
}

/// Parses the manifest section of an artifact.
pub fn read_manifest(script: &str) -> Result<Vec<ManifestEntry>, PackageError> {
    section(script, MANIFEST_START, MANIFEST_END)?
        .into_iter()
        .map(|line| {
            ManifestEntry::parse_line(line)
                .ok_or_else(|| corruption(format!("malformed manifest line '{}'", line)))
        })
        .collect()
}

/// Decodes every payload entry and checks it against the manifest.
pub fn read_artifact(script: &str) -> Result<Vec<(ManifestEntry, Vec<u8>)>, PackageError> {
    let manifest = read_manifest(script)?;
    let payload = section(script, PAYLOAD_START, PAYLOAD_END)?;

    let mut encoded: Vec<String> = Vec::with_capacity(manifest.len());
    for line in payload {
        if let Some(index) = line.strip_prefix(ENTRY_MARKER) {
            let index: usize = index
                .trim_start()
                .parse()
                .map_err(|_| corruption(format!("malformed entry marker '{}'", line)))?;
            if index != encoded.len() {
                return Err(corruption(format!(
                    "payload entry {} out of order (expected {})",
                    index,
                    encoded.len()
                )));
            }
            encoded.push(String::new());
        } else {
            match encoded.last_mut() {
                Some(current) => current.push_str(line),
                None => return Err(corruption("payload data before first entry marker")),
            }
        }
    }

    if encoded.len() != manifest.len() {
        return Err(corruption(format!(
            "manifest lists {} files but payload holds {}",
            manifest.len(),
            encoded.len()
        )));
    }

    manifest
        .into_iter()
        .zip(encoded)
        .map(|(entry, data)| {
            let bytes = STANDARD
                .decode(data.as_bytes())
                .map_err(|e| corruption(format!("'{}' is not valid base64: {}", entry.path, e)))?;
            if bytes.len() as u64 != entry.len {
                return Err(corruption(format!(
                    "'{}' decodes to {} bytes, manifest says {}",
                    entry.path,
                    bytes.len(),
                    entry.len
                )));
            }
            if sha256_hex(&bytes) != entry.sha256 {
                return Err(corruption(format!(
                    "'{}' does not match its manifest hash",
                    entry.path
                )));
            }
            Ok((entry, bytes))
        })
        .collect()
}

/// Self-check: the script must round-trip to exactly `expected`.
pub fn verify(script: &str, expected: &[(ManifestEntry, Vec<u8>)]) -> Result<(), PackageError> {
    let restored = read_artifact(script)?;
    if restored.len() != expected.len() {
        return Err(corruption(format!(
            "restored {} files, expected {}",
            restored.len(),
            expected.len()
        )));
    }
    for ((got_entry, got_bytes), (want_entry, want_bytes)) in restored.iter().zip(expected) {
        if got_entry != want_entry {
            return Err(corruption(format!(
                "manifest entry '{}' differs from source '{}'",
                got_entry.path, want_entry.path
            )));
        }
        if got_bytes != want_bytes {
            return Err(corruption(format!(
                "'{}' differs from the compiled output",
                want_entry.path
            )));
        }
    }
    Ok(())
}
