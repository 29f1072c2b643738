//! Command-line arguments shared by both binaries

use std::path::PathBuf;

use clap::Args;
use ingest_common::config::{load_toml_config, ConfigOverrides, IngestConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Settings accepted on the command line or through the environment
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// TOML config file (default: <config dir>/ingest/config.toml, then /etc/ingest/config.toml)
    #[arg(long, env = "INGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "INGEST_DATABASE")]
    pub database: Option<PathBuf>,

    /// Directory holding source CSV files
    #[arg(long, env = "INGEST_SOURCE_DIR")]
    pub source_dir: Option<PathBuf>,

    /// Target table name
    #[arg(long, env = "INGEST_TABLE")]
    pub table: Option<String>,
}

impl CommonArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            database_path: self.database.clone(),
            source_dir: self.source_dir.clone(),
            table_name: self.table.clone(),
            ..Default::default()
        }
    }

    /// Load the TOML file and merge `overrides` over it
    pub fn resolve(&self, overrides: ConfigOverrides) -> ingest_common::Result<IngestConfig> {
        let toml = load_toml_config(self.config.as_deref())?;
        IngestConfig::resolve(&overrides, &toml)
    }
}

/// Install the tracing subscriber; `RUST_LOG` wins over the configured level
pub fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
