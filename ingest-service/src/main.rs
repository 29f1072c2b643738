//! ingest-service - CSV bulk ingestion service
//!
//! Startup order:
//! 1. Resolve configuration (CLI/env > TOML > defaults)
//! 2. Open the store and create the task table
//! 3. Make sure the data table exists, inferring it from the source directory if not
//! 4. Start load workers and re-deliver unfinished tasks
//! 5. Serve HTTP until Ctrl+C / SIGTERM

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use ingest_common::IngestContext;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ingest_service::cli::{init_tracing, CommonArgs};
use ingest_service::queue::WorkQueue;
use ingest_service::{api, build_router, db, setup, AppState};

/// Command-line arguments for ingest-service
#[derive(Parser, Debug)]
#[command(name = "ingest-service")]
#[command(about = "Bulk CSV ingestion service")]
#[command(version)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Port to listen on
    #[arg(short, long, env = "INGEST_PORT")]
    port: Option<u16>,

    /// Number of concurrent load workers
    #[arg(short, long, env = "INGEST_WORKERS")]
    workers: Option<usize>,

    /// Allowed CORS origin
    #[arg(long, env = "FRONTEND_URL")]
    frontend_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut overrides = args.common.overrides();
    overrides.port = args.port;
    overrides.workers = args.workers;
    overrides.frontend_url = args.frontend_url.clone();

    let config = args
        .common
        .resolve(overrides)
        .context("Failed to resolve configuration")?;

    init_tracing(&config.log_level);

    info!(
        "Starting ingest-service v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Database: {}", config.database_path.display());
    info!("Source directory: {}", config.source_dir.display());
    info!("Table: {}", config.table_name);

    // One connection per worker plus headroom for the HTTP handlers
    let max_connections = u32::try_from(config.workers + 2).unwrap_or(u32::MAX);
    let pool = ingest_common::db::init_database_with(
        &config.database_path,
        max_connections,
        config.busy_timeout(),
    )
    .await
    .context("Failed to open database")?;
    db::init_tables(&pool)
        .await
        .context("Failed to create task table")?;

    let schema = setup::ensure_schema(&pool, &config.table_name, &config.source_dir)
        .await
        .context("Schema setup failed")?;

    let ctx = IngestContext::new(pool.clone(), schema, config.source_dir.clone())
        .with_options(config.load_options);

    let shutdown = CancellationToken::new();
    let (queue, workers) = WorkQueue::start(ctx, config.workers, shutdown.clone());
    queue
        .redeliver_unfinished(&pool)
        .await
        .context("Failed to re-deliver unfinished tasks")?;

    let cors = api::cors_layer(&config.frontend_url)
        .with_context(|| format!("Invalid frontend URL: {}", config.frontend_url))?;
    let state = AppState::new(pool.clone(), queue)
        .with_max_lock_wait(config.load_options.max_lock_wait_ms);
    let app = build_router(state).layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Tasks still queued stay PENDING in the store and run after restart
    shutdown.cancel();
    for handle in workers {
        if let Err(e) = handle.await {
            warn!("Worker exited abnormally: {}", e);
        }
    }

    pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
