use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::codegen::{Dialect, EmitOptions, DEFAULT_RUNTIME_MODULE};
use crate::paths;
use crate::project::{atomic_write, read_json};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config {} has version {found}, newer than supported version {supported}", path.display())]
    UnsupportedVersion { path: PathBuf, found: u32, supported: u32 },
}

// ── Project config ───────────────────────────────────────────────

/// Project-level build configuration, read from `blocksmith.json` at the
/// project root. Every field except `version` has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct ProjectConfig {
    pub version: u32,
    /// Entry file, relative to the project root.
    #[serde(default = "default_entry")]
    #[ts(type = "string")]
    pub entry: PathBuf,
    /// Output directory, relative to the project root.
    #[serde(default = "default_out_dir")]
    #[ts(type = "string")]
    pub out_dir: PathBuf,
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default = "default_server_file")]
    pub server_file: String,
    #[serde(default = "default_types_file")]
    pub types_file: String,
    /// Whether to write the type-declaration artifact.
    #[serde(default = "default_true")]
    pub emit_types: bool,
    /// Module the generated server imports its runtime helpers from.
    #[serde(default = "default_runtime_module")]
    pub runtime_module: String,
}

const CONFIG_VERSION: u32 = 1;

fn default_entry() -> PathBuf {
    PathBuf::from(paths::DEFAULT_ENTRY_FILE)
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_OUT_DIR)
}

fn default_server_file() -> String {
    paths::DEFAULT_SERVER_FILE.to_string()
}

fn default_types_file() -> String {
    paths::DEFAULT_TYPES_FILE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_runtime_module() -> String {
    DEFAULT_RUNTIME_MODULE.to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            entry: default_entry(),
            out_dir: default_out_dir(),
            dialect: Dialect::default(),
            server_file: default_server_file(),
            types_file: default_types_file(),
            emit_types: true,
            runtime_module: default_runtime_module(),
        }
    }
}

impl ProjectConfig {
    pub fn emit_options(&self) -> EmitOptions {
        EmitOptions {
            dialect: self.dialect,
            runtime_module: self.runtime_module.clone(),
        }
    }
}

/// Load `blocksmith.json` from the project root. A missing file yields the
/// defaults.
pub fn load_config(project_root: &Path) -> Result<ProjectConfig, ConfigError> {
    let path = paths::config_path(project_root);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(ProjectConfig::default());
    }

    let config: ProjectConfig = read_json(&path).map_err(|e| match e {
        crate::project::JsonFileError::Io(source) => ConfigError::Io {
            path: path.clone(),
            source,
        },
        crate::project::JsonFileError::Json(source) => ConfigError::Json {
            path: path.clone(),
            source,
        },
    })?;

    if config.version > CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion {
            path,
            found: config.version,
            supported: CONFIG_VERSION,
        });
    }
    Ok(config)
}

/// Write `config` to `blocksmith.json` under the project root.
pub fn save_config(project_root: &Path, config: &ProjectConfig) -> Result<(), ConfigError> {
    let path = paths::config_path(project_root);
    let json = serde_json::to_string_pretty(config).map_err(|source| ConfigError::Json {
        path: path.clone(),
        source,
    })?;
    atomic_write(&path, json.as_bytes()).map_err(|source| ConfigError::Io { path, source })
}

/// JSON Schema of the config file, for editor tooling.
pub fn config_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(ProjectConfig)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert_eq!(config.entry, PathBuf::from("main.bs"));
        assert_eq!(config.dialect, Dialect::Sqlite);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            paths::config_path(dir.path()),
            r#"{ "version": 1, "dialect": "postgres", "out_dir": "dist" }"#,
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.dialect, Dialect::Postgres);
        assert_eq!(config.out_dir, PathBuf::from("dist"));
        assert_eq!(config.server_file, "server.js");
        assert!(config.emit_types);
    }

    #[test]
    fn save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = ProjectConfig {
            runtime_module: "./rt.js".into(),
            emit_types: false,
            ..ProjectConfig::default()
        };
        save_config(dir.path(), &config).unwrap();
        assert_eq!(load_config(dir.path()).unwrap(), config);
    }

    #[test]
    fn future_version_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(paths::config_path(dir.path()), r#"{ "version": 99 }"#).unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn malformed_json_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(paths::config_path(dir.path()), "{ nope").unwrap();
        assert!(matches!(load_config(dir.path()).unwrap_err(), ConfigError::Json { .. }));
    }

    #[test]
    fn schema_lists_dialects() {
        let schema = serde_json::to_string(&config_schema()).unwrap();
        assert!(schema.contains("postgres"));
        assert!(schema.contains("runtime_module"));
    }
}
