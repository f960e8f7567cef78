use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

/// Placeholders the compiler argument template understands.
const KNOWN_PLACEHOLDERS: &[&str] = &["{project}", "{src}", "{out}"];

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads `path` when given, otherwise returns the built-in defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let config = Config::default();
            validate_config(&config)?;
            Ok(config)
        }
    }
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.max_concurrent_pipelines == 0 {
        return Err(ConfigError::Validation {
            message: "max_concurrent_pipelines must be at least 1".to_string(),
        });
    }

    if config.compiler.program.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "compiler.program must not be empty".to_string(),
        });
    }

    if config.compiler.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "compiler.timeout_secs must be at least 1".to_string(),
        });
    }

    // Catch typos like `{outdir}` early; they would otherwise reach the compiler verbatim.
    for arg in &config.compiler.args {
        let mut rest = arg.as_str();
        while let Some(start) = rest.find('{') {
            let tail = &rest[start..];
            let Some(end) = tail.find('}') else {
                break;
            };
            let placeholder = &tail[..=end];
            if !KNOWN_PLACEHOLDERS.contains(&placeholder) {
                return Err(ConfigError::Validation {
                    message: format!(
                        "Unknown placeholder '{}' in compiler.args (expected one of {})",
                        placeholder,
                        KNOWN_PLACEHOLDERS.join(", ")
                    ),
                });
            }
            rest = &tail[end + 1..];
        }
    }

    if config.packager.runtime.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "packager.runtime must not be empty".to_string(),
        });
    }

    for candidate in &config.packager.entry_candidates {
        if candidate.contains('/') || candidate.contains('\\') {
            return Err(ConfigError::Validation {
                message: format!(
                    "Entry candidate '{}' must be a file name at the output root",
                    candidate
                ),
            });
        }
    }

    if config.packager.max_file_bytes == 0 {
        return Err(ConfigError::Validation {
            message: "packager.max_file_bytes must be at least 1".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.compiler.program, "tsc");
        assert_eq!(config.compiler.timeout_secs, 120);
        assert_eq!(config.packager.runtime, "node");
        assert_eq!(
            config.packager.entry_candidates,
            vec!["index.js", "main.js", "app.js"]
        );
        assert_eq!(config.packager.max_file_bytes, 10 * 1024 * 1024);
        assert!(config.max_concurrent_pipelines >= 1);
    }

    #[test]
    fn test_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "staging_directory": "/var/tmp/ts2sh/staging",
            "artifact_directory": "/var/tmp/ts2sh/artifacts",
            "database_path": "/var/lib/ts2sh/jobs.db",
            "max_concurrent_pipelines": 3,
            "compiler": {
                "program": "npx",
                "args": ["tsc", "-p", "{project}", "--outDir", "{out}"],
                "timeout_secs": 30,
                "install_dependencies": false
            },
            "packager": {
                "runtime": "bun",
                "entry_candidates": ["server.js"],
                "max_file_bytes": 1024
            }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.max_concurrent_pipelines, 3);
        assert_eq!(config.compiler.program, "npx");
        assert_eq!(config.compiler.args[0], "tsc");
        assert!(!config.compiler.install_dependencies);
        assert_eq!(config.compiler.install_program, "npm");
        assert_eq!(config.packager.runtime, "bun");
        assert_eq!(config.packager.entry_candidates, vec!["server.js"]);
        assert_eq!(
            config.artifact_directory,
            std::path::PathBuf::from("/var/tmp/ts2sh/artifacts")
        );
    }

    #[test]
    fn test_invalid_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_schema_rejects_unknown_field() {
        let result = load_config_from_str(r#"{ "version": "1.0", "workers": 2 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_zero_concurrency() {
        let result =
            load_config_from_str(r#"{ "version": "1.0", "max_concurrent_pipelines": 0 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_unknown_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "compiler": { "args": ["--outDir", "{outdir}"] } }"#,
        );
        match result {
            Err(ConfigError::Validation { message }) => assert!(message.contains("{outdir}")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_entry_candidate_rejected() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "packager": { "entry_candidates": ["dist/index.js"] } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ts2sh.json");
        std::fs::write(&path, r#"{ "version": "1.0", "max_concurrent_pipelines": 2 }"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.max_concurrent_pipelines, 2);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/ts2sh.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_load_config_or_default_without_path() {
        let config = load_config_or_default(None).unwrap();
        assert_eq!(config.version, "1.0");
        assert!(config.artifact_directory.ends_with("ts2sh_outputs"));
        assert!(config.staging_directory.ends_with("ts2sh_uploads"));
    }
}
