//! Runtime configuration
//!
//! Loaded once at startup from a TOML file named `config` (or `config.toml`) and
//! handed to the components that need it. Search order is the working
//! directory, then the directory named by `BLOOM_CONFIG`. A missing file falls back to defaults; a file that exists but
//! cannot be read or parsed is an error.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Tried in order inside each search directory.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["config", "config.toml"];
pub const CONFIG_PATH_ENV: &str = "BLOOM_CONFIG";
pub const DEFAULT_SQL_CONN_STR: &str = "postgres://localhost/workspace?sslmode=disable";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(rename = "sqlConnStr", default = "default_sql_conn_str")]
    pub sql_conn_str: String,

    #[serde(rename = "searchHosts", default)]
    pub search_hosts: Vec<String>,
}

fn default_sql_conn_str() -> String {
    DEFAULT_SQL_CONN_STR.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sql_conn_str: default_sql_conn_str(),
            search_hosts: Vec::new(),
        }
    }
}

impl Config {
    /// Load from the default search locations.
    pub fn load() -> Result<Self> {
        let extra = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        Self::load_from(&Self::search_paths(extra))
    }

    pub fn search_paths(extra: Option<PathBuf>) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".")];
        paths.extend(extra);
        paths
    }

    /// Load the first config file found in `dirs`, or defaults if none exists.
    pub fn load_from(dirs: &[PathBuf]) -> Result<Self> {
        for dir in dirs {
            for name in CONFIG_FILE_NAMES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    info!("Loading configuration from {}", candidate.display());
                    return Self::from_file(&candidate);
                }
                debug!("No configuration at {}", candidate.display());
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| IngestError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_no_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sql_conn_str, DEFAULT_SQL_CONN_STR);
        assert!(config.search_hosts.is_empty());
    }

    #[test]
    fn test_first_location_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(
            first.path().join("config.toml"),
            "sqlConnStr = \"sqlite::memory:\"\n",
        )
        .unwrap();
        std::fs::write(
            second.path().join("config.toml"),
            "sqlConnStr = \"postgres://elsewhere/db\"\nsearchHosts = [\"es1:9200\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&[
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ])
        .unwrap();
        assert_eq!(config.sql_conn_str, "sqlite::memory:");
        assert!(config.search_hosts.is_empty());
    }

    #[test]
    fn test_extensionless_config_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config"), "sqlConnStr = \"sqlite::memory:\"\n").unwrap();

        let config = Config::load_from(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(config.sql_conn_str, "sqlite::memory:");
    }

    #[test]
    fn test_extensionless_name_is_tried_first() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config"), "sqlConnStr = \"sqlite:bare.db\"\n").unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "sqlConnStr = \"sqlite:suffixed.db\"\n",
        )
        .unwrap();

        let config = Config::load_from(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(config.sql_conn_str, "sqlite:bare.db");
    }

    #[test]
    fn test_falls_through_to_extra_location() {
        let empty = TempDir::new().unwrap();
        let extra = TempDir::new().unwrap();
        std::fs::write(
            extra.path().join("config.toml"),
            "searchHosts = [\"es1:9200\", \"es2:9200\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&[
            empty.path().to_path_buf(),
            extra.path().to_path_buf(),
        ])
        .unwrap();
        assert_eq!(config.sql_conn_str, DEFAULT_SQL_CONN_STR);
        assert_eq!(config.search_hosts, vec!["es1:9200", "es2:9200"]);
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "sqlConnStr = [not toml").unwrap();

        let err = Config::load_from(&[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_search_paths_order() {
        let paths = Config::search_paths(Some(PathBuf::from("/etc/bloom")));
        assert_eq!(paths, vec![PathBuf::from("."), PathBuf::from("/etc/bloom")]);
        assert_eq!(Config::search_paths(None), vec![PathBuf::from(".")]);
    }
}
