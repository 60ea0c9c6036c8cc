//! Engine configuration file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sql::Dialect;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "ENTITY_QUERY_CONFIG";

/// Settings shared by the CLI and embedding applications.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Schema prefix of index tables.
    pub schema: String,
    /// Compound rendering dialect.
    pub dialect: Dialect,
    /// `tracing` filter directive.
    pub log_filter: String,
    /// SQLite database holding the index.
    pub database: Option<PathBuf>,
    /// TOML type model.
    pub model: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            schema: "main".to_string(),
            dialect: Dialect::Sqlite,
            log_filter: "info".to_string(),
            database: None,
            model: None,
        }
    }
}

impl EngineConfig {
    /// Loads `explicit`, else the file named by `$ENTITY_QUERY_CONFIG`, else
    /// the per-user config file. A missing implicit file yields defaults; a
    /// missing explicit one is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return read_file(path);
        }
        let path = env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(default_config_path);
        match path {
            Some(path) if path.exists() => read_file(&path),
            _ => Ok(EngineConfig::default()),
        }
    }

    /// Parses a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }
}

fn read_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Per-user config file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("entity-query").join("config.toml"))
}

/// Failures while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "ConfigRead",
            ConfigError::Parse { .. } => "ConfigParse",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let config = EngineConfig::from_toml("dialect = \"ansi\"\n").unwrap();
        assert_eq!(config.dialect, Dialect::Ansi);
        assert_eq!(config.schema, "main");
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn explicit_file_is_read_and_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "schema = \"idx\"\ndatabase = \"/tmp/index.db\"\nlog_filter = \"debug\"\n",
        )
        .unwrap();
        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.schema, "idx");
        assert_eq!(config.database, Some(PathBuf::from("/tmp/index.db")));
        assert_eq!(config.dialect, Dialect::Sqlite);

        let err = EngineConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert_eq!(err.code(), "ConfigRead");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let err = EngineConfig::from_toml("schema = [").unwrap_err();
        assert_eq!(err.code(), "ConfigParse");
    }
}
