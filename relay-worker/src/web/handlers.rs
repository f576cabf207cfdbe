//! Webhook endpoint handlers.
//!
//! The POST handler only verifies the signature and relays the body. All
//! parsing happens on the subscriber side.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::RelayError;
use crate::queue::{IngressRelay, RelayChannel, RelayOutcome};
use crate::web::handshake::{answer_handshake, HandshakeOutcome, HandshakeQuery};
use crate::web::signature::{SignatureVerifier, SIGNATURE_HEADER};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: SignatureVerifier,
    pub relay: IngressRelay,
}

impl AppState {
    pub fn new(config: Config, channel: Arc<dyn RelayChannel>) -> Self {
        let verifier = SignatureVerifier::new(config.app_secret.clone());
        let relay = IngressRelay::new(channel, config.publish_timeout());

        Self {
            config: Arc::new(config),
            verifier,
            relay,
        }
    }
}

/// Routes served by the ingress web server.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(verify_subscription).post(receive_webhook))
        .route("/health", get(health))
        .with_state(state)
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Subscription Handshake
// =============================================================================

/// GET handshake endpoint.
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
) -> impl IntoResponse {
    match answer_handshake(state.config.verify_token.as_deref(), query) {
        HandshakeOutcome::Accepted(challenge) => (StatusCode::OK, challenge),
        HandshakeOutcome::Rejected => (
            StatusCode::FORBIDDEN,
            "Invalid verification token".to_string(),
        ),
    }
}

// =============================================================================
// Webhook Delivery
// =============================================================================

/// POST webhook endpoint.
///
/// Takes the body as raw bytes so the signature is checked against exactly
/// what was sent.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    info!(
        body_length = body.len(),
        has_signature = signature.is_some(),
        "webhook_received"
    );

    if !state.verifier.verify(&body, signature) {
        warn!(body_length = body.len(), "webhook_signature_rejected");
        return (StatusCode::FORBIDDEN, "Signature mismatch");
    }

    match state.relay.relay(&body).await {
        Ok(RelayOutcome::Empty) | Ok(RelayOutcome::Published { .. }) => (StatusCode::OK, "OK"),
        Err(RelayError::Config(e)) => {
            error!(error = %e, "webhook_relay_misconfigured");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
        Err(e) => {
            error!(error = %e, "webhook_relay_failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}
