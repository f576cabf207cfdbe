//! PageRelay Web Server - webhook receiver.
//!
//! This binary:
//! - Answers the subscription handshake on GET /
//! - Verifies the body signature on POST /
//! - Relays the raw body to RabbitMQ and waits for the broker confirmation
//!
//! Decoding happens in the subscriber.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pagerelay::web::router;
use pagerelay::{AppState, Config, Publisher};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        verify_token_configured = config.verify_token.is_some(),
        app_secret_configured = config.app_secret.is_some(),
        relay_queue = ?config.relay_queue,
        publish_timeout_ms = config.publish_timeout_ms,
        "config_loaded"
    );

    if config.app_secret.is_none() {
        warn!("app_secret_missing_all_posts_will_be_rejected");
    }
    if config.relay_queue.is_none() {
        warn!("relay_queue_missing_all_posts_will_fail");
    }

    // Connects lazily on the first relayed webhook
    let publisher = Publisher::new(
        config.cloudamqp_url.clone(),
        config.relay_queue.clone(),
        config.publish_timeout(),
    );

    let state = AppState::new(config.clone(), Arc::new(publisher.clone()));

    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    publisher.close().await;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
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
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
