//! Error types shared across the ingress and consumer sides.

use thiserror::Error;

/// A required setting is absent. Callers refuse to proceed rather than
/// running in a degraded mode.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("server configuration error: {0} is not set")]
    Missing(&'static str),
}

/// Failure to hand a payload to the durable queue.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("queue transport error: {0}")]
    Transport(String),

    #[error("publish not confirmed within {0:?}")]
    Timeout(std::time::Duration),

    #[error("broker rejected the message")]
    Nacked,
}

impl From<lapin::Error> for RelayError {
    fn from(e: lapin::Error) -> Self {
        RelayError::Transport(e.to_string())
    }
}

/// A relayed payload could not be turned into rows.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid push envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("push envelope data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("malformed webhook payload: {0}")]
    Payload(#[source] serde_json::Error),
}

/// Failure talking to the row store as a whole, as opposed to individual
/// rows being rejected (see [`crate::sink::InsertReport`]).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("table transport error: {0}")]
    Transport(String),

    #[error("insert not acknowledged within {0:?}")]
    Timeout(std::time::Duration),

    #[error("table API returned status {status}: {body}")]
    Status { status: u16, body: String },
}

impl SinkError {
    /// Whether sending the same rows again could succeed.
    ///
    /// Client errors other than 408 and 429 (missing table, bad credentials,
    /// malformed request) will fail identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SinkError::Config(_) => false,
            SinkError::Transport(_) | SinkError::Timeout(_) => true,
            SinkError::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
        }
    }
}
