//! Event decoding.
//!
//! ## Processing Flow
//!
//! ```text
//! push delivery → decode_push_envelope() → raw body → decode() → Vec<ExtractedRow>
//! ```
//!
//! AMQP deliveries already carry the raw body and skip the first step.

pub mod envelope;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, info};

use crate::error::DecodeError;
use crate::queue::PushEnvelope;

pub use envelope::{
    EntryRecord, ExtractedRow, MessageBody, MessagingEvent, Object, Party, WebhookEnvelope,
    PAGE_OBJECT,
};

use envelope::TextCheck;

/// Unwrap a push delivery and return the original body bytes.
pub fn decode_push_envelope(delivery: &[u8]) -> Result<(PushEnvelope, Vec<u8>), DecodeError> {
    let envelope: PushEnvelope = serde_json::from_slice(delivery).map_err(DecodeError::Envelope)?;
    let raw = STANDARD.decode(envelope.message.data.as_bytes())?;

    debug!(
        message_id = ?envelope.message.message_id,
        publish_time = ?envelope.message.publish_time,
        body_length = raw.len(),
        "push_envelope_decoded"
    );

    Ok((envelope, raw))
}

/// Extract text-message rows from a raw webhook body.
///
/// Returns an empty vector for bodies that are not page webhooks and for
/// events without text. Rows follow entry order, then event order. The body,
/// every entry and every text event must be JSON objects.
pub fn decode(raw: &[u8]) -> Result<Vec<ExtractedRow>, DecodeError> {
    let Object(envelope): Object<WebhookEnvelope> =
        serde_json::from_slice(raw).map_err(DecodeError::Payload)?;

    if !envelope.is_page() {
        info!(object = ?envelope.object, "webhook_object_ignored");
        return Ok(Vec::new());
    }

    let entries: Vec<Object<EntryRecord>> = match envelope.entry {
        Some(entry) => serde_json::from_str(entry.get()).map_err(DecodeError::Payload)?,
        None => Vec::new(),
    };

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for Object(entry) in &entries {
        for raw_event in &entry.messaging {
            let Object(check): Object<TextCheck> =
                serde_json::from_str(raw_event.get()).map_err(DecodeError::Payload)?;

            if !check.has_text() {
                skipped += 1;
                continue;
            }

            let Object(event): Object<MessagingEvent> =
                serde_json::from_str(raw_event.get()).map_err(DecodeError::Payload)?;

            rows.extend(ExtractedRow::from_event(event, raw_event));
        }
    }

    info!(
        entries = entries.len(),
        rows = rows.len(),
        skipped_events = skipped,
        "webhook_decoded"
    );

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: &str = r#"{"object":"page","entry":[{"id":"1","time":0,"messaging":[{"sender":{"id":"U"},"recipient":{"id":"P"},"timestamp":1678886400123,"message":{"mid":"m1","text":"hi"}}]}]}"#;

    #[test]
    fn test_decode_single_text_message() {
        let rows = decode(SINGLE.as_bytes()).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.sender_id, "U");
        assert_eq!(row.recipient_id, "P");
        assert_eq!(row.message_text, "hi");
        assert_eq!(row.event_timestamp, 1678886400.123);
        assert_eq!(
            row.raw_payload,
            r#"{"sender":{"id":"U"},"recipient":{"id":"P"},"timestamp":1678886400123,"message":{"mid":"m1","text":"hi"}}"#
        );
    }

    #[test]
    fn test_decode_non_page_object_is_empty() {
        let body = SINGLE.replace(r#""object":"page""#, r#""object":"instagram""#);
        assert!(decode(body.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_decode_missing_object_is_empty() {
        assert!(decode(br#"{"entry":[]}"#).unwrap().is_empty());
    }

    #[test]
    fn test_decode_non_page_object_ignores_malformed_entries() {
        assert!(decode(br#"{"object":"user","entry":"nonsense"}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_decode_skips_events_without_text() {
        let body = r#"{"object":"page","entry":[{"id":"1","time":0,"messaging":[
            {"sender":{"id":"U"},"recipient":{"id":"P"},"delivery":{"mids":["m0"],"watermark":1}},
            {"sender":{"id":"U"},"recipient":{"id":"P"},"timestamp":1,"read":{"watermark":1}},
            {"sender":{"id":"U"},"recipient":{"id":"P"},"timestamp":2,"message":{"mid":"m2","attachments":[]}},
            {"sender":{"id":"U"},"recipient":{"id":"P"},"timestamp":3,"message":{"mid":"m3","text":""}},
            {"sender":{"id":"U"},"recipient":{"id":"P"},"timestamp":4,"postback":{"payload":"GET_STARTED"}}
        ]}]}"#;

        assert!(decode(body.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_decode_preserves_nesting_order() {
        let body = r#"{"object":"page","entry":[
            {"id":"1","time":0,"messaging":[
                {"sender":{"id":"A"},"recipient":{"id":"P"},"timestamp":1000,"message":{"text":"first"}},
                {"sender":{"id":"B"},"recipient":{"id":"P"},"timestamp":2000,"message":{"text":"second"}}
            ]},
            {"id":"2","time":0,"messaging":[
                {"sender":{"id":"C"},"recipient":{"id":"Q"},"timestamp":500,"message":{"text":"third"}}
            ]}
        ]}"#;

        let rows = decode(body.as_bytes()).unwrap();
        let texts: Vec<_> = rows.iter().map(|r| r.message_text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(rows[2].event_timestamp, 0.5);
    }

    #[test]
    fn test_decode_entry_without_messaging() {
        let body = r#"{"object":"page","entry":[{"id":"1","time":0,"changes":[]}]}"#;
        assert!(decode(body.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_decode_invalid_json_is_error() {
        let err = decode(b"{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Payload(_)));
    }

    #[test]
    fn test_decode_text_event_missing_timestamp_is_error() {
        let body = r#"{"object":"page","entry":[{"id":"1","messaging":[
            {"sender":{"id":"U"},"recipient":{"id":"P"},"message":{"text":"hi"}}
        ]}]}"#;
        let err = decode(body.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::Payload(_)));
    }

    #[test]
    fn test_decode_page_with_non_array_entry_is_error() {
        let err = decode(br#"{"object":"page","entry":{"id":"1"}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Payload(_)));
    }

    #[test]
    fn test_decode_positional_body_is_error() {
        let body = r#"["page",[{"messaging":[{"sender":{"id":"U"},"recipient":{"id":"P"},"timestamp":1,"message":{"text":"hi"}}]}]]"#;
        let err = decode(body.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::Payload(_)));

        assert!(matches!(decode(b"[]"), Err(DecodeError::Payload(_))));
    }

    #[test]
    fn test_decode_positional_entry_is_error() {
        let body = r#"{"object":"page","entry":[["1",0,[{"sender":{"id":"U"},"recipient":{"id":"P"},"timestamp":1,"message":{"text":"hi"}}]]]}"#;
        assert!(matches!(decode(body.as_bytes()), Err(DecodeError::Payload(_))));
    }

    #[test]
    fn test_decode_positional_event_fields_are_errors() {
        let array_event = r#"{"object":"page","entry":[{"messaging":[[{"id":"U"},{"id":"P"},1,{"text":"hi"}]]}]}"#;
        assert!(matches!(decode(array_event.as_bytes()), Err(DecodeError::Payload(_))));

        let array_sender = r#"{"object":"page","entry":[{"messaging":[{"sender":["U"],"recipient":{"id":"P"},"timestamp":1,"message":{"text":"hi"}}]}]}"#;
        assert!(matches!(decode(array_sender.as_bytes()), Err(DecodeError::Payload(_))));

        let array_message = r#"{"object":"page","entry":[{"messaging":[{"sender":{"id":"U"},"recipient":{"id":"P"},"timestamp":1,"message":["m1","hi"]}]}]}"#;
        assert!(matches!(decode(array_message.as_bytes()), Err(DecodeError::Payload(_))));
    }

    #[test]
    fn test_decode_push_envelope() {
        let data = STANDARD.encode(SINGLE.as_bytes());
        let delivery = format!(
            r#"{{"message":{{"data":"{}","messageId":"42","publishTime":"2024-01-01T00:00:00Z"}},"subscription":"projects/p/subscriptions/s"}}"#,
            data
        );

        let (envelope, raw) = decode_push_envelope(delivery.as_bytes()).unwrap();
        assert_eq!(raw, SINGLE.as_bytes());
        assert_eq!(envelope.message.message_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_decode_push_envelope_bad_base64() {
        let err = decode_push_envelope(br#"{"message":{"data":"***"}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Base64(_)));
    }

    #[test]
    fn test_decode_push_envelope_not_json() {
        let err = decode_push_envelope(b"plain text").unwrap_err();
        assert!(matches!(err, DecodeError::Envelope(_)));
    }
}
