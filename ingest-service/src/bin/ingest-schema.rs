//! Schema setup utility
//!
//! Infers the data table from the source directory and creates it if it
//! does not exist yet. Run once before the service, or let the service do
//! it on first start.
//!
//! **Usage:**
//! ```bash
//! ingest-schema [--source-dir <dir>] [--table <name>] [--database <file>] [--dry-run]
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use ingest_common::db::{render_create_table, ApplyOutcome, SchemaMaterializer};
use tracing::info;

use ingest_service::cli::{init_tracing, CommonArgs};
use ingest_service::setup;

/// Schema setup utility
#[derive(Parser, Debug)]
#[command(name = "ingest-schema")]
#[command(about = "Infer and create the ingestion table from source CSV headers")]
#[command(version)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Print the CREATE TABLE statement instead of executing it
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args
        .common
        .resolve(args.common.overrides())
        .context("Failed to resolve configuration")?;

    init_tracing(&config.log_level);

    let schema = setup::infer_from_directory(&config.table_name, &config.source_dir)
        .context("Schema inference failed")?;
    info!(
        "Inferred {} columns for '{}': {}",
        schema.columns().len(),
        config.table_name,
        schema.columns().join(", ")
    );

    if args.dry_run {
        println!("{};", render_create_table(&schema));
        return Ok(());
    }

    let pool = ingest_common::db::init_database_with(&config.database_path, 1, config.busy_timeout())
        .await
        .context("Failed to open database")?;

    match SchemaMaterializer::apply(&pool, &schema)
        .await
        .context("Schema materialization failed")?
    {
        ApplyOutcome::Created => info!("Created table '{}'", config.table_name),
        ApplyOutcome::AlreadyPresent => {
            info!("Table '{}' already present and compatible", config.table_name)
        }
    }

    pool.close().await;
    Ok(())
}
