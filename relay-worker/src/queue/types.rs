//! Delivery wrapper types for the consumer side.
//!
//! On the AMQP path the message body is the raw webhook body itself. Push
//! deliveries instead arrive wrapped in a JSON envelope whose `data` field
//! carries the body base64-encoded, alongside the channel's own metadata.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Push delivery as posted to the subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// The message part of a push delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    /// Base64 of the original request body
    #[serde(default)]
    pub data: String,
    #[serde(default, rename = "messageId", alias = "message_id")]
    pub message_id: Option<String>,
    #[serde(default, rename = "publishTime", alias = "publish_time")]
    pub publish_time: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_envelope_accepts_both_field_spellings() {
        let camel: PushEnvelope = serde_json::from_str(
            r#"{"message":{"data":"e30=","messageId":"1","publishTime":"2024-01-01T00:00:00Z"},"subscription":"s"}"#,
        )
        .unwrap();
        assert_eq!(camel.message.message_id.as_deref(), Some("1"));

        let snake: PushEnvelope = serde_json::from_str(
            r#"{"message":{"data":"e30=","message_id":"2","publish_time":"2024-01-01T00:00:00Z"}}"#,
        )
        .unwrap();
        assert_eq!(snake.message.message_id.as_deref(), Some("2"));
        assert!(snake.subscription.is_none());
        assert!(snake.message.attributes.is_empty());
    }
}
