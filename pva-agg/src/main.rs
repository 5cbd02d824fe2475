//! pva-agg - Parking Violation Aggregation microservice
//!
//! Looks license plates up across the registered jurisdiction finders,
//! normalizes what comes back, and stores company-scoped results.

use anyhow::{Context, Result};
use clap::Parser;
use pva_agg::aggregation::EngineOptions;
use pva_agg::registry::FinderRegistry;
use pva_agg::{build_router, AppState};
use pva_common::config::{load_config, TomlConfig};
use pva_common::events::EventBus;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pva-agg
#[derive(Parser, Debug)]
#[command(name = "pva-agg")]
#[command(about = "Parking violation aggregation microservice")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "PVA_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// SQLite database file, overrides the config file
    #[arg(short, long)]
    database: Option<PathBuf>,
}

fn load_effective_config(args: &Args) -> TomlConfig {
    // Config loading logs before the real subscriber exists
    let bootstrap = tracing_subscriber::fmt().finish();
    let mut config =
        tracing::subscriber::with_default(bootstrap, || load_config(args.config.as_deref()));

    if let Some(bind) = &args.bind {
        config.bind_address = Some(bind.clone());
    }
    if let Some(path) = &args.database {
        config.database_path = Some(path.clone());
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_effective_config(&args);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting pva-agg (Parking Violation Aggregation) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = pva_agg::db::init_database_pool(&db_path)
        .await
        .context("Failed to initialize database")?;

    let event_bus = EventBus::new(100);

    let registry = FinderRegistry::from_config(&config, event_bus.clone())
        .context("Failed to build finder registry")?;
    for finder in registry.list_finders() {
        info!(
            finder = %finder.info().name,
            state = %finder.info().state_code,
            "Finder registered"
        );
    }

    let options = EngineOptions::from_config(&config.aggregation);
    info!(
        max_concurrency = options.max_concurrency,
        batch_deadline_secs = options.batch_deadline.map(|d| d.as_secs()),
        "Aggregation engine configured"
    );

    let state = AppState::new(db_pool, event_bus, registry, options);
    let app = build_router(state);

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
