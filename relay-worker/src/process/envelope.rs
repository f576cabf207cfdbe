//! Page webhook payload types and the flat row derived from them.
//!
//! Events are kept as raw JSON until they are known to carry text, so
//! read receipts, deliveries and postbacks never have to satisfy the
//! message schema, and the audit copy of a message is the exact text the
//! platform sent.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{value::MapAccessDeserializer, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

/// The only `object` value that carries page messages.
pub const PAGE_OBJECT: &str = "page";

/// A struct that may only be read from a JSON object.
///
/// Derived `Deserialize` also accepts a JSON array holding the fields in
/// declaration order, which no webhook sender produces.
#[derive(Debug)]
pub struct Object<T>(pub T);

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Object<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ObjectVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for ObjectVisitor<T> {
            type Value = Object<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
                T::deserialize(MapAccessDeserializer::new(map)).map(Object)
            }
        }

        deserializer.deserialize_map(ObjectVisitor(PhantomData))
    }
}

fn object<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Object::deserialize(deserializer).map(|Object(value)| value)
}

fn optional_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Object<T>>::deserialize(deserializer).map(|value| value.map(|Object(inner)| inner))
}

/// Top-level webhook body.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub object: Option<String>,
    /// Left unparsed until `object` is known to be a page.
    #[serde(default)]
    pub entry: Option<Box<RawValue>>,
}

impl WebhookEnvelope {
    pub fn is_page(&self) -> bool {
        self.object.as_deref() == Some(PAGE_OBJECT)
    }
}

/// One entry per page the events belong to.
#[derive(Debug, Deserialize)]
pub struct EntryRecord {
    #[serde(default)]
    pub id: String,
    /// Epoch milliseconds; informational only.
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub messaging: Vec<Box<RawValue>>,
}

/// Just enough of an event to tell whether it carries text.
#[derive(Debug, Deserialize)]
pub struct TextCheck {
    #[serde(default, deserialize_with = "optional_object")]
    pub message: Option<MessageBody>,
}

impl TextCheck {
    pub fn has_text(&self) -> bool {
        self.message
            .as_ref()
            .and_then(|m| m.text.as_deref())
            .is_some_and(|t| !t.is_empty())
    }
}

/// A message-level event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagingEvent {
    #[serde(deserialize_with = "object")]
    pub sender: Party,
    #[serde(deserialize_with = "object")]
    pub recipient: Party,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, deserialize_with = "optional_object")]
    pub message: Option<MessageBody>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Party {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageBody {
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Flat row written to the analytical table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRow {
    pub sender_id: String,
    pub recipient_id: String,
    pub message_text: String,
    /// Seconds since the epoch.
    pub event_timestamp: f64,
    /// The event JSON exactly as it appeared in the webhook body.
    pub raw_payload: String,
}

impl ExtractedRow {
    /// Build a row from an event known to carry text.
    pub(crate) fn from_event(event: MessagingEvent, raw: &RawValue) -> Option<Self> {
        let message_text = event.message?.text.filter(|t| !t.is_empty())?;

        Some(Self {
            sender_id: event.sender.id,
            recipient_id: event.recipient.id,
            message_text,
            event_timestamp: millis_to_seconds(event.timestamp),
            raw_payload: raw.get().to_string(),
        })
    }
}

/// Convert epoch milliseconds to floating-point epoch seconds.
pub fn millis_to_seconds(millis: i64) -> f64 {
    millis as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_to_seconds() {
        assert_eq!(millis_to_seconds(1678886400123), 1678886400.123);
        assert_eq!(millis_to_seconds(0), 0.0);
    }

    #[test]
    fn test_text_check() {
        let check: TextCheck = serde_json::from_str(r#"{"message":{"text":"hi"}}"#).unwrap();
        assert!(check.has_text());

        let empty: TextCheck = serde_json::from_str(r#"{"message":{"text":""}}"#).unwrap();
        assert!(!empty.has_text());

        let attachment: TextCheck =
            serde_json::from_str(r#"{"message":{"mid":"m","attachments":[]}}"#).unwrap();
        assert!(!attachment.has_text());

        let read: TextCheck = serde_json::from_str(r#"{"read":{"watermark":1}}"#).unwrap();
        assert!(!read.has_text());
    }

    #[test]
    fn test_envelope_object_check() {
        let page: WebhookEnvelope = serde_json::from_str(r#"{"object":"page","entry":[]}"#).unwrap();
        assert!(page.is_page());

        let other: WebhookEnvelope = serde_json::from_str(r#"{"object":"user"}"#).unwrap();
        assert!(!other.is_page());

        let missing: WebhookEnvelope = serde_json::from_str(r#"{}"#).unwrap();
        assert!(!missing.is_page());
    }

    #[test]
    fn test_object_rejects_arrays() {
        let Object(party): Object<Party> = serde_json::from_str(r#"{"id":"U"}"#).unwrap();
        assert_eq!(party.id, "U");

        let err = serde_json::from_str::<Object<Party>>(r#"["U"]"#).unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"));

        assert!(serde_json::from_str::<TextCheck>(r#"{"message":[null,"hi"]}"#).is_err());

        let null_message: TextCheck = serde_json::from_str(r#"{"message":null}"#).unwrap();
        assert!(!null_message.has_text());
    }
}
