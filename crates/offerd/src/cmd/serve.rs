//! Serve command - run the aggregation server
//!
//! Loads configuration from the environment (missing credentials are
//! fatal), connects both Redis caches and the MongoDB share store,
//! builds the five provider adapters and serves the HTTP API until
//! SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use offerd_api::{build_router, AppState};
use offerd_config::Config;
use offerd_pipeline::OfferStreamer;
use offerd_providers::{
    ByteMeAdapter, PingPerfectAdapter, ProviderAdapter, ProviderFleet, RetrySchedule,
    ServusSpeedAdapter, VerbynDichAdapter, WebWunderAdapter,
};
use offerd_store::{MongoShareRepository, QueryCache, RedisQueryCache, ShareRepository};

/// Run the serve command
pub async fn run() -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "offerd starting"
    );

    let config = Config::from_env().context("failed to load configuration")?;
    if config.debug {
        info!("debug mode enabled");
    }

    // process-global store clients
    let address_cache: Arc<dyn QueryCache> = Arc::new(
        RedisQueryCache::connect(&config.address_cache.connection_url(), "address-cache")
            .await
            .context("failed to connect address cache")?,
    );
    let user_cache: Arc<dyn QueryCache> = Arc::new(
        RedisQueryCache::connect(&config.user_cache.connection_url(), "user-cache")
            .await
            .context("failed to connect user cache")?,
    );
    let shares: Arc<dyn ShareRepository> = Arc::new(
        MongoShareRepository::connect(&config.share_db)
            .await
            .context("failed to connect share store")?,
    );

    // the provider fleet
    let retry = RetrySchedule::new(config.server.retry_delays.clone());
    let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
        Arc::new(ByteMeAdapter::new(&config.providers.byteme, retry.clone())),
        Arc::new(PingPerfectAdapter::new(
            &config.providers.pingperfect,
            retry.clone(),
        )),
        Arc::new(ServusSpeedAdapter::new(
            &config.providers.servusspeed,
            retry.clone(),
        )),
        Arc::new(VerbynDichAdapter::new(
            &config.providers.verbyndich,
            retry.clone(),
        )),
        Arc::new(WebWunderAdapter::new(&config.providers.webwunder, retry)),
    ];
    let fleet = Arc::new(ProviderFleet::new(adapters, config.server.api_timeout));

    let streamer = Arc::new(OfferStreamer::new(
        Arc::clone(&fleet),
        Arc::clone(&address_cache),
        Arc::clone(&user_cache),
        config.server.freshness_window,
    ));

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(
        streamer,
        user_cache,
        shares,
        shutdown.clone(),
    ));
    let app = build_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", bind_addr))?;

    info!(
        address = %bind_addr,
        providers = fleet.len(),
        api_timeout_secs = config.server.api_timeout.as_secs(),
        freshness_window_secs = config.server.freshness_window.as_secs(),
        "offerd server running"
    );

    let shutdown_signal = {
        let shutdown = shutdown.clone();
        async move {
            wait_for_shutdown().await;
            info!("shutdown signal received, stopping server...");
            shutdown.cancel();
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("server error")?;

    info!("offerd shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
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
