//! Bootstrap configuration
//!
//! Settings are resolved with the following priority:
//! 1. Command-line argument or environment variable (parsed by the binary)
//! 2. TOML config file
//! 3. Built-in defaults
//!
//! Nothing here is read again after startup; changing it needs a restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::db::DEFAULT_BUSY_TIMEOUT;
use crate::loader::LoadOptions;
use crate::{Error, Result};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8000;
/// Default number of load workers
pub const DEFAULT_WORKERS: usize = 4;
/// Default data table name
pub const DEFAULT_TABLE: &str = "game_stats";
/// Default source directory scanned and resolved against
pub const DEFAULT_SOURCE_DIR: &str = "/data";
/// Default allowed CORS origin
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";

/// TOML file contents (every key optional)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Directory holding source CSV files
    #[serde(default)]
    pub source_dir: Option<PathBuf>,

    /// Target table for loaded rows
    #[serde(default)]
    pub table_name: Option<String>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Number of concurrent load workers
    #[serde(default)]
    pub workers: Option<usize>,

    /// Allowed CORS origin
    #[serde(default)]
    pub frontend_url: Option<String>,

    /// Rows per INSERT statement
    #[serde(default)]
    pub max_rows_per_statement: Option<usize>,

    /// SQLite busy_timeout per connection, in milliseconds
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,

    /// Total retry budget for a write blocked by another writer, in milliseconds
    #[serde(default)]
    pub max_lock_wait_ms: Option<u64>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub table_name: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub frontend_url: Option<String>,
}

/// Fully resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub database_path: PathBuf,
    pub source_dir: PathBuf,
    pub table_name: String,
    pub port: u16,
    pub workers: usize,
    pub frontend_url: String,
    pub log_level: String,
    pub busy_timeout_ms: u64,
    pub load_options: LoadOptions,
}

impl IngestConfig {
    /// Merge overrides over TOML values over defaults, then validate
    pub fn resolve(overrides: &ConfigOverrides, toml: &TomlConfig) -> Result<Self> {
        let defaults = LoadOptions::default();

        let config = Self {
            database_path: overrides
                .database_path
                .clone()
                .or_else(|| toml.database_path.clone())
                .unwrap_or_else(default_database_path),
            source_dir: overrides
                .source_dir
                .clone()
                .or_else(|| toml.source_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_DIR)),
            table_name: overrides
                .table_name
                .clone()
                .or_else(|| toml.table_name.clone())
                .unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            port: overrides.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            workers: overrides.workers.or(toml.workers).unwrap_or(DEFAULT_WORKERS),
            frontend_url: overrides
                .frontend_url
                .clone()
                .or_else(|| toml.frontend_url.clone())
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            log_level: toml.logging.level.clone(),
            busy_timeout_ms: toml
                .busy_timeout_ms
                .unwrap_or(DEFAULT_BUSY_TIMEOUT.as_millis() as u64),
            load_options: LoadOptions {
                max_rows_per_statement: toml
                    .max_rows_per_statement
                    .unwrap_or(defaults.max_rows_per_statement),
                max_lock_wait_ms: toml.max_lock_wait_ms.unwrap_or(defaults.max_lock_wait_ms),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(Error::Config("table_name must not be empty".to_string()));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.load_options.max_rows_per_statement == 0 {
            return Err(Error::Config(
                "max_rows_per_statement must be at least 1".to_string(),
            ));
        }
        if self.busy_timeout_ms == 0 {
            return Err(Error::Config("busy_timeout_ms must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Per-connection busy timeout
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Load the TOML config file.
///
/// An explicitly named file must exist. Otherwise the per-user file
/// (`<config dir>/ingest/config.toml`) then `/etc/ingest/config.toml` are
/// tried; finding neither yields an all-default config.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) if path.is_file() => Some(path.to_path_buf()),
        Some(path) => {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )))
        }
        None => find_config_file(),
    };

    match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
            let config = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
            info!("Loaded config file: {}", path.display());
            Ok(config)
        }
        None => Ok(TomlConfig::default()),
    }
}

fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("ingest").join("config.toml"));
    let system_config = PathBuf::from("/etc/ingest/config.toml");

    user_config
        .into_iter()
        .chain(std::iter::once(system_config))
        .find(|p| p.is_file())
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ingest").join("ingest.db"))
        .unwrap_or_else(|| PathBuf::from("./ingest_data/ingest.db"))
}
