//! Ingress relay: verified body in, one durable message out.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use super::publisher::RelayChannel;
use crate::error::RelayError;

/// What the relay did with a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Empty body; nothing was published.
    Empty,
    /// Published and confirmed under this message id.
    Published { message_id: String },
}

/// Forwards verified raw bodies to the durable channel.
#[derive(Clone)]
pub struct IngressRelay {
    channel: Arc<dyn RelayChannel>,
    timeout: Duration,
}

impl IngressRelay {
    pub fn new(channel: Arc<dyn RelayChannel>, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    /// Publish `body` byte-for-byte and wait for the confirmation.
    ///
    /// Bounded by the configured timeout. No deduplication happens here, so a
    /// sender retry after a lost response produces a second message.
    pub async fn relay(&self, body: &[u8]) -> Result<RelayOutcome, RelayError> {
        if body.is_empty() {
            debug!("relay_empty_body_skipped");
            return Ok(RelayOutcome::Empty);
        }

        let message_id = tokio::time::timeout(self.timeout, self.channel.publish(body))
            .await
            .map_err(|_| {
                error!(timeout_ms = self.timeout.as_millis() as u64, "relay_publish_timeout");
                RelayError::Timeout(self.timeout)
            })??;

        info!(message_id = %message_id, body_length = body.len(), "webhook_relayed");

        Ok(RelayOutcome::Published { message_id })
    }
}
