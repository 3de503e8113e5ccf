use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nocturne_core::{
    metrics, validate_config, AudioConverter, BlobStore, Config, Dispatcher, FfmpegConverter,
    RateLimiter, Reaper, SqliteBlobStore, SqliteRateLimitStore, SqliteTaskStore, TaskStore,
};

use nocturne_server::api::create_router;
use nocturne_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("NOCTURNE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration; a missing file means defaults everywhere
    let config = if config_path.exists() {
        info!("Loading configuration from {:?}", config_path);
        nocturne_core::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        info!(
            "No config file at {:?}, using built-in defaults",
            config_path
        );
        Config::default()
    };

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Refuse to start without working ffmpeg/ffprobe binaries
    let converter = FfmpegConverter::new(config.converter.clone());
    converter
        .validate()
        .await
        .context("ffmpeg or ffprobe was not found; install them and try again")?;
    info!("Converter validated: {}", converter.name());

    // Create SQLite stores
    let tasks: Arc<dyn TaskStore> = Arc::new(
        SqliteTaskStore::new(&config.database.path).context("Failed to create task store")?,
    );
    info!("Task store initialized");

    let blobs: Arc<dyn BlobStore> = Arc::new(
        SqliteBlobStore::new(&config.database.path).context("Failed to create blob store")?,
    );
    info!("Blob store initialized");

    let ratelimit_store = Arc::new(
        SqliteRateLimitStore::new(&config.database.path)
            .context("Failed to create rate limit store")?,
    );
    let limiter = RateLimiter::new(ratelimit_store.clone());
    info!("Rate limiter initialized");

    // Register metrics
    let registry = prometheus::Registry::new();
    for metric in metrics::all_metrics() {
        registry
            .register(metric)
            .context("Failed to register metrics")?;
    }

    // Start the dispatcher and its worker pool
    let dispatcher = Dispatcher::new(
        config.dispatch.clone(),
        Arc::clone(&tasks),
        Arc::clone(&blobs),
        Arc::new(converter),
    );
    dispatcher.start().await;
    info!("Dispatcher started");

    // Start the reaper
    let reaper = Reaper::new(
        config.reaper.clone(),
        &config.database.path,
        Arc::clone(&tasks),
        Arc::clone(&blobs),
        ratelimit_store,
    )
    .context("Failed to create reaper")?;
    reaper.start().await;
    info!("Reaper started");

    // Create app state and router
    let state = Arc::new(AppState::new(
        config.clone(),
        tasks,
        blobs,
        limiter,
        registry,
    ));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    // Drain in-flight conversions, then stop the background loops
    info!("Server shutting down...");
    dispatcher.stop().await;
    reaper.stop().await;
    info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
