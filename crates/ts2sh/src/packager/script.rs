//! Self-extracting bash script template.
//!
//! Layout, top to bottom: bootstrap preamble, manifest section, payload
//! section, trailer. Both sections are no-op heredocs, so the script is plain
//! text that bash reads straight through; the extraction helpers re-read the
//! script file with awk to pull the sections back out.

use std::fmt::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::sanitize::{comment_text, shell_quote};

use super::manifest::ManifestEntry;

pub const FORMAT_VERSION: &str = "ts2sh-artifact/1";

pub const MANIFEST_START: &str = ": <<'__TS2SH_MANIFEST__'";
pub const MANIFEST_END: &str = "__TS2SH_MANIFEST__";
pub const PAYLOAD_START: &str = ": <<'__TS2SH_PAYLOAD_END__'";
pub const PAYLOAD_END: &str = "__TS2SH_PAYLOAD_END__";
pub const ENTRY_MARKER: &str = "__TS2SH_ENTRY__";

/// Base64 line width inside the payload section.
pub const LINE_WIDTH: usize = 76;

/// Exit status of the script when a restored file does not match the manifest.
pub const CORRUPTION_EXIT_CODE: i32 = 3;

pub struct ScriptParts<'a> {
    pub project_name: &'a str,
    pub entry_point: &'a str,
    pub runtime: &'a str,
    pub generated_at: DateTime<Utc>,
    pub files: &'a [(ManifestEntry, Vec<u8>)],
}

pub fn render(parts: &ScriptParts<'_>) -> String {
    let payload_bytes: usize = parts.files.iter().map(|(_, c)| c.len()).sum();
    let mut script = String::with_capacity(payload_bytes * 4 / 3 + 8 * 1024);

    // Writing to a String cannot fail.
    let _ = write!(
        script,
        "#!/usr/bin/env bash\n\
         # Generated by ts2sh. Do not edit: the payload is verified on extraction.\n\
         # Format: {format}\n\
         # Project: {project}\n\
         # Generated: {generated}\n\
         # Entry: {entry}\n\
         set -eu\n\
         \n\
         TS2SH_PROJECT={project_q}\n\
         TS2SH_ENTRY={entry_q}\n\
         TS2SH_RUNTIME={runtime_q}\n\
         TS2SH_SELF=\"$0\"\n",
        format = FORMAT_VERSION,
        project = comment_text(parts.project_name),
        generated = parts
            .generated_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        entry = comment_text(parts.entry_point),
        project_q = shell_quote(&comment_text(parts.project_name)),
        entry_q = shell_quote(parts.entry_point),
        runtime_q = shell_quote(parts.runtime),
    );

    script.push_str(PREAMBLE);
    let _ = write!(
        script,
        "TS2SH_MANIFEST_START={}\n\
         TS2SH_MANIFEST_END={}\n\
         TS2SH_PAYLOAD_START={}\n\
         TS2SH_PAYLOAD_END={}\n\n",
        shell_quote(MANIFEST_START),
        shell_quote(MANIFEST_END),
        shell_quote(PAYLOAD_START),
        shell_quote(PAYLOAD_END),
    );
    script.push_str(HELPERS);

    script.push('\n');
    script.push_str(MANIFEST_START);
    script.push('\n');
    for (entry, _) in parts.files {
        script.push_str(&entry.to_line());
        script.push('\n');
    }
    script.push_str(MANIFEST_END);
    script.push_str("\n\n");

    script.push_str(PAYLOAD_START);
    script.push('\n');
    for (index, (_, content)) in parts.files.iter().enumerate() {
        let _ = writeln!(script, "{} {}", ENTRY_MARKER, index);
        let encoded = STANDARD.encode(content);
        let mut start = 0;
        while start < encoded.len() {
            let end = (start + LINE_WIDTH).min(encoded.len());
            script.push_str(&encoded[start..end]);
            script.push('\n');
            start = end;
        }
    }
    script.push_str(PAYLOAD_END);
    script.push_str("\n\n");

    script.push_str(TRAILER);
    script
}

const PREAMBLE: &str = r#"
ts2sh_die() {
    ts2sh_status=$1
    shift
    printf '%s\n' "$*" >&2
    exit "$ts2sh_status"
}

if ! command -v "$TS2SH_RUNTIME" >/dev/null 2>&1; then
    ts2sh_die 127 "Error: '$TS2SH_RUNTIME' is required to run $TS2SH_PROJECT but was not found in PATH. Please install it and try again."
fi
if ! command -v awk >/dev/null 2>&1; then
    ts2sh_die 127 "Error: 'awk' is required to unpack $TS2SH_PROJECT but was not found in PATH."
fi
if ! command -v base64 >/dev/null 2>&1; then
    ts2sh_die 127 "Error: 'base64' is required to unpack $TS2SH_PROJECT but was not found in PATH."
fi
if command -v sha256sum >/dev/null 2>&1; then
    ts2sh_sha256() { sha256sum | awk '{ print $1 }'; }
elif command -v shasum >/dev/null 2>&1; then
    ts2sh_sha256() { shasum -a 256 | awk '{ print $1 }'; }
else
    ts2sh_die 127 "Error: 'sha256sum' or 'shasum' is required to verify $TS2SH_PROJECT but neither was found in PATH."
fi
if printf 'dHMyc2g=' | base64 -d >/dev/null 2>&1; then
    ts2sh_decode() { base64 -d; }
else
    ts2sh_decode() { base64 -D; }
fi

"#;

const HELPERS: &str = r#"ts2sh_section() {
    awk -v start="$1" -v end="$2" '
        active && $0 == end { exit }
        active { print }
        $0 == start { active = 1 }
    ' "$TS2SH_SELF"
}

ts2sh_split_payload() {
    awk -v start="$TS2SH_PAYLOAD_START" -v end="$TS2SH_PAYLOAD_END" -v dir="$1" '
        active && $0 == end { exit }
        active && $1 == "__TS2SH_ENTRY__" {
            if (out != "") close(out)
            out = dir "/" $2 ".b64"
            printf "" > out
            next
        }
        active && out != "" { print > out }
        $0 == start { active = 1 }
    ' "$TS2SH_SELF"
}

ts2sh_extract() {
    ts2sh_dest=$1
    ts2sh_work=$2
    ts2sh_section "$TS2SH_MANIFEST_START" "$TS2SH_MANIFEST_END" > "$ts2sh_work/manifest"
    ts2sh_split_payload "$ts2sh_work"
    ts2sh_index=0
    while IFS= read -r ts2sh_line; do
        ts2sh_len=${ts2sh_line%% *}
        ts2sh_rest=${ts2sh_line#* }
        ts2sh_hash=${ts2sh_rest%% *}
        ts2sh_path=${ts2sh_rest#* }
        ts2sh_target="$ts2sh_dest/$ts2sh_path"
        mkdir -p "$(dirname "$ts2sh_target")"
        if [ -f "$ts2sh_work/$ts2sh_index.b64" ]; then
            ts2sh_decode < "$ts2sh_work/$ts2sh_index.b64" > "$ts2sh_target" \
                || ts2sh_die 3 "PackageCorruption: payload for '$ts2sh_path' could not be decoded"
        else
            ts2sh_die 3 "PackageCorruption: payload for '$ts2sh_path' is missing"
        fi
        ts2sh_actual_len=$(wc -c < "$ts2sh_target" | tr -d ' ')
        ts2sh_actual_hash=$(ts2sh_sha256 < "$ts2sh_target")
        if [ "$ts2sh_actual_len" != "$ts2sh_len" ] || [ "$ts2sh_actual_hash" != "$ts2sh_hash" ]; then
            ts2sh_die 3 "PackageCorruption: '$ts2sh_path' does not match the manifest"
        fi
        ts2sh_index=$((ts2sh_index + 1))
    done < "$ts2sh_work/manifest"
}
"#;

const TRAILER: &str = r#"TS2SH_TMP=$(mktemp -d "${TMPDIR:-/tmp}/ts2sh.XXXXXX") \
    || ts2sh_die 1 "Error: could not create a temporary directory"
ts2sh_cleanup() {
    cd /
    rm -rf "$TS2SH_TMP"
}
trap ts2sh_cleanup EXIT
trap 'exit 129' HUP
trap 'exit 130' INT
trap 'exit 143' TERM

mkdir "$TS2SH_TMP/app" "$TS2SH_TMP/payload"
ts2sh_extract "$TS2SH_TMP/app" "$TS2SH_TMP/payload"
rm -rf "$TS2SH_TMP/payload"

if [ -f "$TS2SH_TMP/app/package.json" ] && command -v npm >/dev/null 2>&1; then
    echo "Installing dependencies..." >&2
    (cd "$TS2SH_TMP/app" && npm install --silent >/dev/null 2>&1) \
        || echo "Warning: dependency installation failed" >&2
fi

echo "Running $TS2SH_PROJECT..." >&2
echo "----------------------------------------" >&2

set +e
"$TS2SH_RUNTIME" "$TS2SH_TMP/app/$TS2SH_ENTRY" "$@"
ts2sh_status=$?
set -e
exit "$ts2sh_status"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn files() -> Vec<(ManifestEntry, Vec<u8>)> {
        vec![
            (
                ManifestEntry::for_content("index.js", b"console.log('hi');\n"),
                b"console.log('hi');\n".to_vec(),
            ),
            (ManifestEntry::for_content("empty.txt", b""), Vec::new()),
        ]
    }

    fn render_demo(project: &str) -> String {
        let files = files();
        render(&ScriptParts {
            project_name: project,
            entry_point: "index.js",
            runtime: "node",
            generated_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            files: &files,
        })
    }

    #[test]
    fn test_starts_with_shebang_and_header() {
        let script = render_demo("demo");
        let mut lines = script.lines();
        assert_eq!(lines.next(), Some("#!/usr/bin/env bash"));
        assert!(script.contains("# Format: ts2sh-artifact/1\n"));
        assert!(script.contains("# Project: demo\n"));
        assert!(script.contains("# Generated: 2026-01-02T03:04:05Z\n"));
        assert!(script.contains("TS2SH_RUNTIME='node'\n"));
    }

    #[test]
    fn test_sections_appear_in_order() {
        let script = render_demo("demo");
        let manifest = script.find(&format!("\n{}\n", MANIFEST_START)).unwrap();
        let payload = script.find(&format!("\n{}\n", PAYLOAD_START)).unwrap();
        let trailer = script.find("trap ts2sh_cleanup EXIT").unwrap();
        assert!(manifest < payload);
        assert!(payload < trailer);
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(render_demo("demo"), render_demo("demo"));
    }

    #[test]
    fn test_markers_occur_once_as_whole_lines() {
        let script = render_demo("demo");
        for marker in [MANIFEST_START, MANIFEST_END, PAYLOAD_START, PAYLOAD_END] {
            assert_eq!(
                script.lines().filter(|l| *l == marker).count(),
                1,
                "{}",
                marker
            );
        }
    }

    #[test]
    fn test_payload_lines_are_wrapped() {
        let content = vec![7u8; 1000];
        let files = vec![(ManifestEntry::for_content("big.bin", &content), content)];
        let script = render(&ScriptParts {
            project_name: "demo",
            entry_point: "big.bin",
            runtime: "node",
            generated_at: Utc::now(),
            files: &files,
        });

        let start = script.find(&format!("{} 0\n", ENTRY_MARKER)).unwrap();
        let end = script.find(&format!("\n{}\n", PAYLOAD_END)).unwrap();
        let body = &script[start..end];
        for line in body.lines().skip(1) {
            assert!(line.len() <= LINE_WIDTH);
        }
    }

    #[test]
    fn test_hostile_project_name_is_quoted() {
        let script = render_demo("x'; rm -rf / #\nmore");
        assert!(script.contains("TS2SH_PROJECT='x'\\''; rm -rf / # more'\n"));
        assert!(script.contains("# Project: x'; rm -rf / # more\n"));
    }
}
