//! Pairing Broker - Entry point.

use anyhow::Context;
use pairing_bridge_client::BridgeClient;
use pairing_broker::{
    api::{create_router_with_rate_limit, AppState, PairingRateLimit},
    config::Config,
    session::spawn_sweeper,
    BridgeProvider, DeliveryFormatter, DisconnectPolicy, LifecycleTimings, SessionController,
    SessionRegistry, SessionStore, SessionSweeper,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.log.level);

    info!("Starting Pairing Broker");

    // Initialize bridge provider
    let client = BridgeClient::new(&config.bridge.api_url).context("Failed to create bridge client")?;
    let provider = BridgeProvider::new(
        client,
        config.bridge.poll_interval,
        config.bridge.browser.clone(),
    );

    if provider.health_check().await {
        info!("Bridge healthy at {}", config.bridge.api_url);
    } else {
        warn!(
            "Bridge not reachable at {} - pairing requests will fail until it is",
            config.bridge.api_url
        );
    }

    // Session storage; directories left by a previous run are stale
    let store = SessionStore::new(config.sessions.root.clone());
    let stale = store
        .remove_all()
        .await
        .context("Failed to clear sessions root")?;
    if stale > 0 {
        info!("Removed {} session directories from a previous run", stale);
    }

    let controller = SessionController::new(
        Arc::new(provider),
        store.clone(),
        SessionRegistry::new(),
        DeliveryFormatter::new(config.delivery.clone()),
        DisconnectPolicy::new(config.sessions.max_retries),
        LifecycleTimings::default().with_pairing_timeout(config.sessions.pairing_timeout),
    );

    let sweeper = spawn_sweeper(SessionSweeper::new(
        store,
        config.sessions.sweep_interval,
        config.sessions.max_age,
    ));

    // Create router with rate limiting
    let state = AppState::new(controller.clone());
    let rate_limit = PairingRateLimit::per_minute(config.rate_limit.global_per_minute);
    let app = create_router_with_rate_limit(state, rate_limit);

    // Bind to address
    let addr = SocketAddr::new(
        config
            .server
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address {}", config.server.listen_addr))?,
        config.server.port,
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on {}", addr);
    info!("Pairing endpoint: http://{}/code?number=...", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");
    sweeper.abort();
    controller.shutdown().await;

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
