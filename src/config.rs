//! ORM configuration
//!
//! Loaded from a TOML file (`config` feature) and then overridden by
//! environment variables:
//!
//! ```toml
//! dry_run = false
//! allow_global_update = false
//!
//! [database]
//! url = "sqlite://app.db"
//! max_connections = 10
//!
//! [logger]
//! level = "info"
//! log_sql = true
//! slow_threshold_ms = 200
//!
//! [naming]
//! singular_table = false
//! table_prefix = ""
//! ```

use crate::database::DatabaseConnectionConfig;
use crate::error::{Error, Result};
use crate::models::NamingStrategy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrmConfig {
    #[serde(default)]
    pub database: DatabaseConnectionConfig,

    #[serde(default)]
    pub logger: LoggerConfig,

    #[serde(default)]
    pub naming: NamingStrategy,

    /// Build statements without executing them
    #[serde(default)]
    pub dry_run: bool,

    /// Allow UPDATE and DELETE without conditions
    #[serde(default)]
    pub allow_global_update: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log every statement with its elapsed time
    #[serde(default)]
    pub log_sql: bool,

    /// Statements slower than this log at warn level; 0 disables
    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: u64,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_sql: false,
            slow_threshold_ms: default_slow_threshold_ms(),
        }
    }
}

impl LoggerConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_slow_threshold_ms() -> u64 {
    200
}

impl OrmConfig {
    /// Configuration for a connection URL with default settings
    pub fn with_url(url: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.database.url = url.into();
        config
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let content = std::fs::read_to_string(path_ref).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path_ref.display(),
                e
            ))
        })?;

        let mut config = Self::from_toml_str(&content).map_err(|e| {
            e.with_context(format!("Failed to parse config file '{}'", path_ref.display()))
        })?;
        config.apply_env_overrides()?;
        config.validate()?;

        log::debug!(
            "Successfully loaded configuration from: {}",
            path_ref.display()
        );
        Ok(config)
    }

    /// Parse TOML without environment overrides
    #[cfg(feature = "config")]
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    #[cfg(not(feature = "config"))]
    pub fn from_toml_str(_content: &str) -> Result<Self> {
        Err(Error::config(
            "TOML configuration requires the `config` feature",
        ))
    }

    /// Defaults with environment variable overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database.url = url;
        }
        // More specific than DATABASE_URL
        if let Ok(url) = env::var("RUSTF_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(max) = env::var("RUSTF_DB_MAX_CONNECTIONS") {
            self.database.max_connections = max
                .parse()
                .map_err(|_| Error::config("Invalid RUSTF_DB_MAX_CONNECTIONS value"))?;
        }
        if let Ok(min) = env::var("RUSTF_DB_MIN_CONNECTIONS") {
            self.database.min_connections = min
                .parse()
                .map_err(|_| Error::config("Invalid RUSTF_DB_MIN_CONNECTIONS value"))?;
        }
        if let Ok(timeout) = env::var("RUSTF_DB_TIMEOUT") {
            self.database.connect_timeout = timeout
                .parse()
                .map_err(|_| Error::config("Invalid RUSTF_DB_TIMEOUT value"))?;
        }
        if let Ok(log_sql) = env::var("RUSTF_DB_LOG_SQL") {
            self.logger.log_sql = log_sql
                .parse()
                .map_err(|_| Error::config("Invalid RUSTF_DB_LOG_SQL value"))?;
        }
        if let Ok(threshold) = env::var("RUSTF_DB_SLOW_THRESHOLD_MS") {
            self.logger.slow_threshold_ms = threshold
                .parse()
                .map_err(|_| Error::config("Invalid RUSTF_DB_SLOW_THRESHOLD_MS value"))?;
        }
        if let Ok(singular) = env::var("RUSTF_DB_SINGULAR_TABLE") {
            self.naming.singular_table = singular
                .parse()
                .map_err(|_| Error::config("Invalid RUSTF_DB_SINGULAR_TABLE value"))?;
        }
        if let Ok(prefix) = env::var("RUSTF_DB_TABLE_PREFIX") {
            self.naming.table_prefix = prefix;
        }
        if let Ok(dry_run) = env::var("RUSTF_DB_DRY_RUN") {
            self.dry_run = dry_run
                .parse()
                .map_err(|_| Error::config("Invalid RUSTF_DB_DRY_RUN value"))?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.database.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrmConfig::default();
        assert_eq!(config.logger.level, "info");
        assert_eq!(config.logger.slow_threshold_ms, 200);
        assert!(!config.dry_run);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.logger.level_filter(), log::LevelFilter::Info);
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_parse_toml() {
        let config = OrmConfig::from_toml_str(
            r#"
            allow_global_update = true

            [database]
            url = "sqlite::memory:"
            max_connections = 4

            [naming]
            singular_table = true
            "#,
        )
        .unwrap();
        assert!(config.allow_global_update);
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.database.min_connections, 1);
        assert!(config.naming.singular_table);
        assert!(!config.logger.log_sql);
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orm.toml");
        std::fs::write(&path, "dry_run = \"maybe\"").unwrap();

        let err = OrmConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("orm.toml"));
        assert_eq!(err.error_code(), "E_CONFIG");
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        assert!(OrmConfig::default().validate().is_err());
        assert!(OrmConfig::with_url("sqlite::memory:").validate().is_ok());
    }
}
