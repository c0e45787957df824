//! pinscout-ai - content discovery and validation service
//!
//! Accepts search prompts over HTTP and runs each through warm-up,
//! candidate acquisition and bounded-concurrency AI validation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pinscout_common::config;
use pinscout_common::events::EventBus;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pinscout_ai::services::{HttpCandidateSource, OpenAiClassifier};
use pinscout_ai::{AppState, EVENT_BUS_CAPACITY};

/// Command-line arguments for pinscout-ai
#[derive(Parser, Debug)]
#[command(name = "pinscout-ai")]
#[command(about = "Prompt-driven content discovery and AI validation service")]
#[command(version)]
struct Args {
    /// Folder holding the database
    #[arg(short, long, env = "PINSCOUT_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "PINSCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "PINSCOUT_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PINSCOUT_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut toml_config =
        config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pinscout-ai");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Some(host) = args.host {
        toml_config.server.host = host;
    }
    if let Some(port) = args.port {
        toml_config.server.port = port;
    }

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = config::prepare_root_folder(&root_folder)?;
    info!("Root folder: {}", root_folder.display());
    info!("Database: {}", db_path.display());

    let api_key = config::resolve_classifier_api_key(&toml_config)?;

    let db_pool = pinscout_ai::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

    let classifier = OpenAiClassifier::new(&toml_config.classifier, api_key)
        .context("Failed to build classifier client")?;
    let source = HttpCandidateSource::new(&toml_config.acquisition)
        .context("Failed to build candidate source client")?;
    info!(
        model = %toml_config.classifier.model,
        max_concurrent = toml_config.classifier.max_concurrent,
        scraper = %toml_config.acquisition.base_url,
        "Workflow clients initialized"
    );

    let coordinator = pinscout_ai::build_coordinator(
        db_pool.clone(),
        event_bus.clone(),
        Arc::new(classifier),
        Arc::new(source),
        &toml_config,
    );

    coordinator
        .recover_interrupted_runs()
        .await
        .context("Failed to recover interrupted runs")?;

    let tasks = coordinator.tasks().clone();
    let state = AppState::new(event_bus, coordinator);
    let app = pinscout_ai::build_router(state, &toml_config.server.allowed_origins);

    let addr: SocketAddr = format!("{}:{}", toml_config.server.host, toml_config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                toml_config.server.host, toml_config.server.port
            )
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tasks.shutdown();
    db_pool.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install signal handler: {}", e);
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
