//! Server configuration
//!
//! Layered: built-in defaults (which read a few `LENS_*` variables), then an
//! optional TOML file, then `LENS__SECTION__KEY` environment overrides.

use crate::storage::file::DEFAULT_LOG_FILE;
use crate::storage::sqlite::DEFAULT_TABLE;
use crate::storage::DEFAULT_MAX_RECORDS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    /// Listen address for the HTTP gateway
    pub listen_addr: String,

    /// Route prefix, e.g. `/lens`. Empty serves `/queries` at the root.
    pub api_prefix: String,

    /// `text` or `json`
    pub log_format: LogFormat,

    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Retention cap; 0 disables eviction
    pub max_records: usize,

    pub backend: BackendConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Database {
        path: PathBuf,
        #[serde(default = "default_table")]
        table: String,
        #[serde(default = "default_true")]
        auto_migrate: bool,
    },
    File {
        #[serde(default = "default_log_file")]
        path: PathBuf,
    },
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            listen_addr: std::env::var("LENS_LISTEN")
                .unwrap_or_else(|_| "127.0.0.1:8087".to_string()),
            api_prefix: std::env::var("LENS_API_PREFIX").unwrap_or_default(),
            log_format: match std::env::var("LENS_LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            storage: StorageConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_records: std::env::var("LENS_MAX_RECORDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_RECORDS),
            backend: BackendConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        match std::env::var("LENS_DATABASE_PATH") {
            Ok(path) => BackendConfig::Database {
                path: PathBuf::from(path),
                table: default_table(),
                auto_migrate: true,
            },
            Err(_) => BackendConfig::File {
                path: default_log_file(),
            },
        }
    }
}

impl LensConfig {
    /// Load configuration, merging `path` (if any) and `LENS__*` overrides
    /// over the defaults.
    #[cfg(feature = "gateway")]
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let defaults = config::Config::try_from(&LensConfig::default())
            .context("Failed to encode default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("LENS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Normalized route prefix: empty, or `/segment` without a trailing slash.
    pub fn route_prefix(&self) -> String {
        let trimmed = self.api_prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_prefix_normalization() {
        let mut config = LensConfig::default();
        config.api_prefix = String::new();
        assert_eq!(config.route_prefix(), "");
        config.api_prefix = "lens/".to_string();
        assert_eq!(config.route_prefix(), "/lens");
        config.api_prefix = "/".to_string();
        assert_eq!(config.route_prefix(), "");
    }

    #[cfg(feature = "gateway")]
    #[test]
    fn test_load_database_backend_from_file() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
listen_addr = "0.0.0.0:9000"
api_prefix = "/lens"

[storage]
max_records = 50

[storage.backend]
type = "database"
path = "/tmp/lens-test.db"
"#
        )
        .unwrap();

        let config = LensConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.storage.max_records, 50);
        assert_eq!(
            config.storage.backend,
            BackendConfig::Database {
                path: PathBuf::from("/tmp/lens-test.db"),
                table: "lens_logs".to_string(),
                auto_migrate: true,
            }
        );
    }

    #[test]
    fn test_backend_tag_parsing() {
        let backend: BackendConfig = toml::from_str("type = \"file\"").unwrap();
        assert_eq!(
            backend,
            BackendConfig::File {
                path: PathBuf::from("data/query_logs.log")
            }
        );
    }
}
