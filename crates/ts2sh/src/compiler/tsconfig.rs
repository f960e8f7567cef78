use std::path::{Path, PathBuf};

use serde_json::json;

pub const TSCONFIG_FILE: &str = "tsconfig.json";

/// Compiler settings used when a project ships without its own `tsconfig.json`.
pub fn default_tsconfig() -> serde_json::Value {
    json!({
        "compilerOptions": {
            "target": "ES2020",
            "module": "commonjs",
            "rootDir": ".",
            "strict": true,
            "esModuleInterop": true,
            "skipLibCheck": true,
            "forceConsistentCasingInFileNames": true,
            "resolveJsonModule": true
        },
        "exclude": ["node_modules", "**/*.test.ts", "**/*.spec.ts"]
    })
}

/// Writes the default `tsconfig.json` into `src_dir` unless one exists.
/// Returns the path of the project file and whether it was written.
pub fn ensure_tsconfig(src_dir: &Path) -> std::io::Result<(PathBuf, bool)> {
    let path = src_dir.join(TSCONFIG_FILE);
    if path.exists() {
        return Ok((path, false));
    }
    let body = serde_json::to_string_pretty(&default_tsconfig())?;
    std::fs::write(&path, body)?;
    Ok((path, true))
}
