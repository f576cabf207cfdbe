//! Consumer side: relayed body in, rows appended to the table.
//!
//! Delivery is at-least-once and unordered. Each delivery is handled on its
//! own with no state carried between deliveries, so a redelivered message
//! simply inserts its rows again.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, info, warn};

use crate::process::{decode, decode_push_envelope};
use crate::sink::RowSink;

/// What should happen to a delivery after processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Valid payload without any text messages.
    NoRows,
    /// All rows were accepted by the table.
    Inserted(usize),
    /// Transient failure; the channel should deliver the message again.
    Retry(String),
    /// The message can never succeed; drop it without redelivery.
    DeadLetter(String),
}

impl ConsumeOutcome {
    pub fn should_redeliver(&self) -> bool {
        matches!(self, ConsumeOutcome::Retry(_))
    }
}

/// Decodes relayed bodies and writes their rows.
#[derive(Clone)]
pub struct Subscriber {
    sink: Arc<dyn RowSink>,
}

impl Subscriber {
    pub fn new(sink: Arc<dyn RowSink>) -> Self {
        Self { sink }
    }

    /// Process a raw webhook body as relayed by the ingress side.
    ///
    /// Malformed payloads and permanent store errors (missing table, bad
    /// credentials) are dead-lettered since redelivery cannot fix them. Any
    /// row rejection retries the whole batch, which may duplicate
    /// the rows that were already accepted.
    pub async fn handle_body(&self, raw: &[u8]) -> ConsumeOutcome {
        let rows = match decode(raw) {
            Ok(rows) => rows,
            Err(e) => {
                error!(
                    error = %e,
                    body_preview = %String::from_utf8_lossy(&raw[..raw.len().min(500)]),
                    "webhook_decode_failed"
                );
                return ConsumeOutcome::DeadLetter(e.to_string());
            }
        };

        if rows.is_empty() {
            info!("no_text_messages_in_payload");
            return ConsumeOutcome::NoRows;
        }

        match self.sink.insert(&rows).await {
            Ok(report) if report.is_complete() => ConsumeOutcome::Inserted(report.inserted),
            Ok(report) => {
                warn!(
                    inserted = report.inserted,
                    failed = report.failed.len(),
                    first_error = ?report.failed.first(),
                    "rows_rejected_retrying_batch"
                );
                ConsumeOutcome::Retry(format!(
                    "{} of {} rows rejected",
                    report.failed.len(),
                    rows.len()
                ))
            }
            Err(e) if e.is_retryable() => {
                error!(error = %e, rows = rows.len(), "row_insert_failed");
                ConsumeOutcome::Retry(e.to_string())
            }
            Err(e) => {
                error!(error = %e, rows = rows.len(), "row_insert_rejected_permanently");
                ConsumeOutcome::DeadLetter(e.to_string())
            }
        }
    }

    /// Process a push delivery wrapping a base64-encoded body.
    pub async fn handle_push(&self, delivery: &[u8]) -> ConsumeOutcome {
        match decode_push_envelope(delivery) {
            Ok((envelope, raw)) => {
                info!(
                    message_id = ?envelope.message.message_id,
                    subscription = ?envelope.subscription,
                    body_length = raw.len(),
                    "push_delivery_received"
                );
                self.handle_body(&raw).await
            }
            Err(e) => {
                error!(error = %e, "push_envelope_invalid");
                ConsumeOutcome::DeadLetter(e.to_string())
            }
        }
    }
}

/// Push delivery endpoint.
///
/// Any 2xx acknowledges the delivery, so dead-lettered messages are answered
/// with 200 after logging; only retryable failures ask for redelivery.
pub async fn push_handler(State(subscriber): State<Subscriber>, body: Bytes) -> impl IntoResponse {
    match subscriber.handle_push(&body).await {
        ConsumeOutcome::NoRows | ConsumeOutcome::Inserted(_) => (StatusCode::OK, "OK"),
        ConsumeOutcome::DeadLetter(reason) => {
            error!(reason = %reason, "push_delivery_dead_lettered");
            (StatusCode::OK, "Dropped")
        }
        ConsumeOutcome::Retry(_) => (StatusCode::SERVICE_UNAVAILABLE, "Retry"),
    }
}
