//! PageRelay - verified page webhook ingest and relay.
//!
//! This library provides shared modules for the PageRelay binaries:
//! - `pagerelay-web`: Webhook receiver that verifies and relays raw bodies
//! - `pagerelay-subscriber`: Consumer that decodes bodies into table rows
//! - `pagerelay-sign`: Computes the signature header for a body
//!
//! ## Architecture
//!
//! ```text
//! Platform → Web Server → relay queue → Subscriber → analytical table
//! ```

pub mod config;
pub mod error;
pub mod process;
pub mod queue;
pub mod sink;
pub mod subscriber;
pub mod web;

// Re-export commonly used types
pub use config::{Config, SubscriberMode, TableRef};
pub use error::{ConfigError, DecodeError, RelayError, SinkError};
pub use process::{decode, decode_push_envelope, ExtractedRow};
pub use queue::{IngressRelay, Publisher, PushEnvelope, RelayChannel, RelayOutcome};
pub use sink::{InsertReport, RowError, RowSink, TableSink};
pub use subscriber::{ConsumeOutcome, Subscriber};
pub use web::AppState;
