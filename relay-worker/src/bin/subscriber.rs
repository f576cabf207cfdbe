//! PageRelay Subscriber - relayed webhook consumer.
//!
//! This binary:
//! 1. Consumes raw webhook bodies from the relay queue
//! 2. Decodes them into flat message rows
//! 3. Appends the rows to the analytical table
//!
//! With `PUSH_PORT` set it also accepts push deliveries on `POST /push`.
//! Without `RELAY_QUEUE` it runs push-only and never connects to RabbitMQ.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{routing::post, Router};
use futures::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};
use reqwest::Client;
use tokio::{net::TcpListener, signal, sync::Semaphore};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pagerelay::subscriber::push_handler;
use pagerelay::{Config, ConsumeOutcome, Subscriber, SubscriberMode, TableSink};

/// Pause before a failed delivery is handed back to the broker.
const REQUEUE_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("subscriber_starting");

    let config = Config::from_env();

    // Refuse to start rather than acknowledging messages we cannot store
    let mode = config
        .subscriber_mode()
        .context("No delivery source configured (RELAY_QUEUE or PUSH_PORT)")?;

    let client = Client::builder()
        .build()
        .context("Failed to create HTTP client")?;

    let sink = TableSink::from_config(client, &config).context("Table configuration incomplete")?;

    info!(
        table_endpoint = %sink.endpoint(),
        queue = ?mode.queue(),
        push_port = ?mode.push_port(),
        concurrency = config.subscriber_concurrency,
        insert_timeout_ms = config.insert_timeout_ms,
        "config_loaded"
    );

    let subscriber = Subscriber::new(Arc::new(sink));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    match mode {
        SubscriberMode::Both { queue, push_port } => {
            tokio::select! {
                res = consume(&config, &queue, subscriber.clone()) => res?,
                res = serve_push(push_port, subscriber) => res?,
                _ = &mut shutdown => info!("subscriber_stopping"),
            }
        }
        SubscriberMode::Queue(queue) => {
            tokio::select! {
                res = consume(&config, &queue, subscriber) => res?,
                _ = &mut shutdown => info!("subscriber_stopping"),
            }
        }
        SubscriberMode::Push(port) => {
            tokio::select! {
                res = serve_push(port, subscriber) => res?,
                _ = &mut shutdown => info!("subscriber_stopping"),
            }
        }
    }

    info!("subscriber_shutdown_complete");
    Ok(())
}

/// Consume the relay queue until the consumer stream ends.
async fn consume(config: &Config, queue: &str, subscriber: Subscriber) -> Result<()> {
    info!(url_length = config.cloudamqp_url.len(), "rabbitmq_connecting");

    let conn = Connection::connect(&config.cloudamqp_url, ConnectionProperties::default())
        .await
        .context("Failed to connect to RabbitMQ")?;

    info!("rabbitmq_connected");

    let channel = conn
        .create_channel()
        .await
        .context("Failed to create channel")?;

    let prefetch_count = u16::try_from(config.subscriber_concurrency).unwrap_or(u16::MAX);
    channel
        .basic_qos(prefetch_count, BasicQosOptions::default())
        .await
        .context("Failed to set QoS")?;

    info!(prefetch_count = prefetch_count, "rabbitmq_qos_set");

    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare relay queue")?;

    let mut consumer = channel
        .basic_consume(
            queue,
            "pagerelay-subscriber",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("Failed to start consumer")?;

    info!(queue = queue, "rabbitmq_consumer_started");

    let channel = Arc::new(channel);
    let permits = Arc::new(Semaphore::new(config.subscriber_concurrency.max(1)));

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(error = %e, "rabbitmq_delivery_error");
                continue;
            }
        };

        let permit = Arc::clone(&permits)
            .acquire_owned()
            .await
            .context("Concurrency limiter closed")?;

        let delivery_tag = delivery.delivery_tag;
        let message_id = delivery
            .properties
            .message_id()
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        info!(
            queue = queue,
            message_id = %message_id,
            delivery_tag = delivery_tag,
            redelivered = delivery.redelivered,
            body_length = delivery.data.len(),
            "rabbitmq_webhook_received"
        );

        let channel = Arc::clone(&channel);
        let subscriber = subscriber.clone();

        tokio::spawn(async move {
            let outcome = subscriber.handle_body(&delivery.data).await;
            settle(&channel, delivery_tag, &message_id, outcome).await;
            drop(permit);
        });
    }

    warn!("rabbitmq_consumer_closed");
    Ok(())
}

/// Ack, requeue or drop a delivery according to its outcome.
async fn settle(channel: &Channel, delivery_tag: u64, message_id: &str, outcome: ConsumeOutcome) {
    let result = match &outcome {
        ConsumeOutcome::NoRows | ConsumeOutcome::Inserted(_) => {
            channel
                .basic_ack(delivery_tag, BasicAckOptions::default())
                .await
        }
        ConsumeOutcome::Retry(reason) => {
            warn!(message_id = %message_id, reason = %reason, "webhook_requeued");
            tokio::time::sleep(REQUEUE_DELAY).await;
            channel
                .basic_nack(
                    delivery_tag,
                    BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    },
                )
                .await
        }
        ConsumeOutcome::DeadLetter(reason) => {
            // Goes to the queue's dead-letter exchange when one is bound
            error!(message_id = %message_id, reason = %reason, "webhook_dead_lettered");
            channel
                .basic_nack(
                    delivery_tag,
                    BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    },
                )
                .await
        }
    };

    match result {
        Ok(()) => info!(message_id = %message_id, outcome = ?outcome, "webhook_processed"),
        Err(e) => error!(delivery_tag = delivery_tag, error = %e, "rabbitmq_settle_failed"),
    }
}

/// Serve push deliveries until the listener fails.
async fn serve_push(port: u16, subscriber: Subscriber) -> Result<()> {
    let app = Router::new()
        .route("/push", post(push_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(subscriber);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind push listener")?;

    info!(address = %addr, "push_listener_started");

    axum::serve(listener, app).await.context("Push listener error")?;
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
}
