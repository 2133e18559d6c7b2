//! Classification of frames received from a client.

use chatwire_database::MessageId;
use serde_json::Value;

use crate::error::DeliveryError;

/// What an inbound text frame asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// `{"message_id": <positive int>, ..}`. Any `user_id` or conversation id
    /// the client sends along is ignored.
    ReadReceipt { message_id: MessageId },
    /// Anything else is passed on to the rest of the conversation untouched.
    Relay(String),
}

/// Classify a text frame.
///
/// Blank frames and JSON objects whose `message_id` is present but not a
/// positive integer are rejected as malformed. The caller logs and drops those
/// without closing the connection.
pub fn classify(frame: &str) -> Result<Inbound, DeliveryError> {
    if frame.trim().is_empty() {
        return Err(DeliveryError::MalformedFrame("empty frame".to_string()));
    }

    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(frame) else {
        return Ok(Inbound::Relay(frame.to_string()));
    };

    match fields.get("message_id") {
        None => Ok(Inbound::Relay(frame.to_string())),
        Some(value) => match value.as_i64() {
            Some(message_id) if message_id > 0 => Ok(Inbound::ReadReceipt { message_id }),
            _ => Err(DeliveryError::MalformedFrame(format!(
                "message_id must be a positive integer, got {value}"
            ))),
        },
    }
}

/// Binary frames are accepted only when they carry UTF-8 text.
pub fn classify_binary(frame: &[u8]) -> Result<Inbound, DeliveryError> {
    let text = std::str::from_utf8(frame)
        .map_err(|err| DeliveryError::MalformedFrame(format!("binary frame is not utf-8: {err}")))?;
    classify(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_message_id_is_a_read_receipt() {
        assert_eq!(
            classify(r#"{"message_id": 42}"#).unwrap(),
            Inbound::ReadReceipt { message_id: 42 }
        );
    }

    #[test]
    fn client_supplied_identity_is_dropped() {
        let inbound = classify(r#"{"message_id": 5, "user_id": 999, "chat_id": 1234}"#).unwrap();
        assert_eq!(inbound, Inbound::ReadReceipt { message_id: 5 });
    }

    #[test]
    fn non_receipt_json_is_relayed_verbatim() {
        let frame = r#"{"type":"signal","sdp":"offer"}"#;
        assert_eq!(classify(frame).unwrap(), Inbound::Relay(frame.to_string()));
    }

    #[test]
    fn plain_text_is_relayed() {
        assert_eq!(classify("hello there").unwrap(), Inbound::Relay("hello there".to_string()));
        assert_eq!(classify("[1,2,3]").unwrap(), Inbound::Relay("[1,2,3]".to_string()));
    }

    #[test]
    fn invalid_message_ids_are_malformed() {
        for frame in [
            r#"{"message_id": 0}"#,
            r#"{"message_id": -3}"#,
            r#"{"message_id": "12"}"#,
            r#"{"message_id": 1.5}"#,
            r#"{"message_id": null}"#,
        ] {
            assert!(
                matches!(classify(frame), Err(DeliveryError::MalformedFrame(_))),
                "{frame} should be malformed"
            );
        }
    }

    #[test]
    fn blank_frames_are_malformed() {
        assert!(matches!(classify(""), Err(DeliveryError::MalformedFrame(_))));
        assert!(matches!(classify(" \n\t"), Err(DeliveryError::MalformedFrame(_))));
    }

    #[test]
    fn binary_frames_must_be_utf8() {
        assert_eq!(
            classify_binary(br#"{"message_id": 3}"#).unwrap(),
            Inbound::ReadReceipt { message_id: 3 }
        );
        assert!(matches!(
            classify_binary(&[0xff, 0xfe, 0x00]),
            Err(DeliveryError::MalformedFrame(_))
        ));
    }
}
