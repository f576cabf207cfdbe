//! Subscription handshake.
//!
//! When the webhook is registered the platform issues a GET carrying the
//! verify token configured on its side and a challenge string to echo back.

use serde::Deserialize;
use tracing::{info, warn};

/// Query parameters of the handshake request.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    #[serde(default, rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(default, rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(default, rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Result of a handshake attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Echo this challenge with a success status.
    Accepted(String),
    /// Token missing or wrong.
    Rejected,
}

/// Answer a handshake request.
///
/// No configured token means every attempt is rejected.
pub fn answer_handshake(configured_token: Option<&str>, query: HandshakeQuery) -> HandshakeOutcome {
    let Some(expected) = configured_token else {
        warn!("handshake_token_not_configured");
        return HandshakeOutcome::Rejected;
    };

    match query.verify_token.as_deref() {
        Some(provided) if provided == expected => {
            info!(mode = ?query.mode, "handshake_accepted");
            HandshakeOutcome::Accepted(query.challenge.unwrap_or_default())
        }
        provided => {
            warn!(
                has_token = provided.is_some(),
                mode = ?query.mode,
                "handshake_token_invalid"
            );
            HandshakeOutcome::Rejected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(token: Option<&str>, challenge: Option<&str>) -> HandshakeQuery {
        HandshakeQuery {
            mode: Some("subscribe".to_string()),
            verify_token: token.map(str::to_string),
            challenge: challenge.map(str::to_string),
        }
    }

    #[test]
    fn test_matching_token_echoes_challenge() {
        let outcome = answer_handshake(Some("tok"), query(Some("tok"), Some("1158201444")));
        assert_eq!(outcome, HandshakeOutcome::Accepted("1158201444".to_string()));
    }

    #[test]
    fn test_wrong_token_rejected() {
        let outcome = answer_handshake(Some("tok"), query(Some("nope"), Some("c")));
        assert_eq!(outcome, HandshakeOutcome::Rejected);
    }

    #[test]
    fn test_missing_token_rejected() {
        let outcome = answer_handshake(Some("tok"), query(None, Some("c")));
        assert_eq!(outcome, HandshakeOutcome::Rejected);
    }

    #[test]
    fn test_unconfigured_token_rejects_even_when_absent() {
        assert_eq!(
            answer_handshake(None, query(None, Some("c"))),
            HandshakeOutcome::Rejected
        );
    }

    #[test]
    fn test_missing_challenge_echoes_empty() {
        let outcome = answer_handshake(Some("tok"), query(Some("tok"), None));
        assert_eq!(outcome, HandshakeOutcome::Accepted(String::new()));
    }

    #[test]
    fn test_query_deserializes_dotted_names() {
        let q: HandshakeQuery = serde_json::from_value(serde_json::json!({
            "hub.mode": "subscribe",
            "hub.verify_token": "tok",
            "hub.challenge": "abc"
        }))
        .unwrap();
        assert_eq!(q.verify_token.as_deref(), Some("tok"));
        assert_eq!(q.challenge.as_deref(), Some("abc"));
    }
}
