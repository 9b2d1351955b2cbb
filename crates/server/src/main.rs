//! Attest server binary.

use anyhow::{Context, Result};
use attest_core::config::AppConfig;
use attest_db::Database;
use attest_server::{AppState, create_router};
use attest_upload::ChunkStore;
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Attest - compliance evidence upload server
#[derive(Parser, Debug)]
#[command(name = "attestd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "ATTEST_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Attest v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override
    // everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("ATTEST_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().map_err(anyhow::Error::msg)?;

    // Connect the pool; construction failure is fatal, not retried
    let db = Database::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    db.migrate().await.context("failed to run migrations")?;
    db.health_check()
        .await
        .context("database health check failed")?;
    tracing::info!("Database initialized");

    let store = ChunkStore::new(&config.upload.root)
        .await
        .context("failed to initialize upload store")?;
    tracing::info!(root = %config.upload.root.display(), "Upload store initialized");

    let bind = config.server.bind.clone();
    let state = AppState::new(config, db.clone(), store);
    let app = create_router(state);

    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Return pooled connections before exit
    db.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
