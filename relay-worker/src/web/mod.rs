//! Web server module for the ingress endpoint.
//!
//! This module provides a thin web server that:
//! - Answers the subscription handshake
//! - Verifies `X-Hub-Signature-256` on every POST
//! - Relays the untouched body to RabbitMQ before answering

pub mod handlers;
pub mod handshake;
pub mod signature;

pub use handlers::{health, receive_webhook, router, verify_subscription, AppState, HealthResponse};
pub use handshake::{answer_handshake, HandshakeOutcome, HandshakeQuery};
pub use signature::{sign_payload, verify_signature, SignatureVerifier, SIGNATURE_HEADER};
