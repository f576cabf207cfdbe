//! Async RabbitMQ publisher for relaying raw webhook bodies.
//!
//! One connection and channel are shared by every request handled by the
//! process. They are created lazily on first use and recreated if the broker
//! drops them.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{ConfigError, RelayError};

/// Durable channel the ingress side publishes to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelayChannel: Send + Sync {
    /// Publish `payload` unmodified and wait until the broker has accepted it.
    ///
    /// Returns the message id attached to the published message.
    async fn publish(&self, payload: &[u8]) -> Result<String, RelayError>;
}

/// Async RabbitMQ publisher with connection management.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    url: String,
    queue: Option<String>,
    connect_timeout: Duration,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl Publisher {
    /// Create a publisher. No connection is made until the first publish.
    ///
    /// A missing `queue` is reported on every publish attempt as a
    /// configuration error.
    pub fn new(url: String, queue: Option<String>, connect_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                url,
                queue,
                connect_timeout,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    fn queue(&self) -> Result<&str, RelayError> {
        self.inner
            .queue
            .as_deref()
            .ok_or(RelayError::Config(ConfigError::Missing("RELAY_QUEUE")))
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel, RelayError> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let queue = self.queue()?;

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("rabbitmq_publisher_connecting");

        let conn = tokio::time::timeout(
            self.inner.connect_timeout,
            Connection::connect(&self.inner.url, ConnectionProperties::default()),
        )
        .await
        .map_err(|_| RelayError::Timeout(self.inner.connect_timeout))??;

        info!("rabbitmq_publisher_connected");

        let ch = conn.create_channel().await?;

        // Publishes resolve only once the broker has taken responsibility
        ch.confirm_select(ConfirmSelectOptions::default()).await?;

        ch.queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

        info!(queue = queue, "rabbitmq_queue_declared");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_publisher_closed");
    }
}

#[async_trait]
impl RelayChannel for Publisher {
    async fn publish(&self, payload: &[u8]) -> Result<String, RelayError> {
        let queue = self.queue()?;
        let channel = self.ensure_connected().await?;

        let message_id = uuid::Uuid::new_v4().to_string();
        let published_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let confirmation = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into())
                    .with_message_id(message_id.clone().into())
                    .with_timestamp(published_at),
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            warn!(queue = queue, message_id = %message_id, "rabbitmq_publish_nacked");
            return Err(RelayError::Nacked);
        }

        info!(
            queue = queue,
            message_id = %message_id,
            body_length = payload.len(),
            "rabbitmq_relay_published"
        );

        Ok(message_id)
    }
}
