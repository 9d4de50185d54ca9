use bincode::Options;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CONTENT_TYPE_FILE, CONTENT_TYPE_TEXT, MAX_PAYLOAD_SIZE, TEXT_CONTENT_NAME, TEXT_MIME_TYPE,
};
use crate::error::ProtocolError;
use crate::timestamp::{format_timestamp, parse_timestamp_or_now};
use crate::types::Address;

/// Who a payload is addressed to. A payload names either a direct
/// receiver or a group, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    User(String),
    Group(String),
}

impl From<Address> for Recipient {
    fn from(address: Address) -> Self {
        match address {
            Address::User(name) => Self::User(name),
            Address::Group(name) => Self::Group(name),
        }
    }
}

/// The content block of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// File name for transfers, empty for text messages.
    pub name: String,
    /// `"text"` or `"file"`.
    pub content_type: String,
    pub mime_type: String,
    pub body: Vec<u8>,
}

/// The record carried as the body of every broker message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub emitter: String,
    pub recipient: Recipient,
    /// Send time formatted with [`crate::constants::DATE_FORMAT`].
    pub date: String,
    pub content: Content,
}

impl Payload {
    pub fn text(
        emitter: impl Into<String>,
        recipient: Recipient,
        sent_at: &NaiveDateTime,
        text: &str,
    ) -> Self {
        Self {
            emitter: emitter.into(),
            recipient,
            date: format_timestamp(sent_at),
            content: Content {
                name: TEXT_CONTENT_NAME.to_string(),
                content_type: CONTENT_TYPE_TEXT.to_string(),
                mime_type: TEXT_MIME_TYPE.to_string(),
                body: text.as_bytes().to_vec(),
            },
        }
    }

    pub fn file(
        emitter: impl Into<String>,
        recipient: Recipient,
        sent_at: &NaiveDateTime,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            emitter: emitter.into(),
            recipient,
            date: format_timestamp(sent_at),
            content: Content {
                name: file_name.into(),
                content_type: CONTENT_TYPE_FILE.to_string(),
                mime_type: mime_type.into(),
                body,
            },
        }
    }

    /// Direct receiver, if this is a one-to-one payload.
    pub fn receiver(&self) -> Option<&str> {
        match &self.recipient {
            Recipient::User(name) => Some(name),
            Recipient::Group(_) => None,
        }
    }

    /// Target group, if this is a group payload.
    pub fn group(&self) -> Option<&str> {
        match &self.recipient {
            Recipient::Group(name) => Some(name),
            Recipient::User(_) => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.recipient, Recipient::Group(_))
    }

    pub fn is_file(&self) -> bool {
        self.content.content_type == CONTENT_TYPE_FILE
    }

    /// Send time; the current time when `date` is not parseable.
    pub fn timestamp(&self) -> NaiveDateTime {
        parse_timestamp_or_now(&self.date)
    }

    /// Body as text. Invalid UTF-8 is replaced rather than rejected.
    pub fn text_body(&self) -> String {
        String::from_utf8_lossy(&self.content.body).into_owned()
    }

    /// Serialize to binary (bincode, fixed-width integers)
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        codec()
            .serialize(self)
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        codec()
            .deserialize(data)
            .map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_PAYLOAD_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::now;

    #[test]
    fn test_file_payload_roundtrip() {
        let payload = Payload::file(
            "alice",
            Recipient::Group("team".into()),
            &now(),
            "report.pdf",
            "application/pdf",
            vec![0, 159, 146, 150, 255],
        );

        let bytes = payload.to_bytes().unwrap();
        let restored = Payload::from_bytes(&bytes).unwrap();

        assert_eq!(restored, payload);
        assert!(restored.is_group());
        assert!(restored.is_file());
        assert_eq!(restored.group(), Some("team"));
        assert_eq!(restored.receiver(), None);
    }

    #[test]
    fn test_text_payload_fields() {
        let payload = Payload::text("bob", Recipient::User("alice".into()), &now(), "olá");
        let restored = Payload::from_bytes(&payload.to_bytes().unwrap()).unwrap();

        assert_eq!(restored.receiver(), Some("alice"));
        assert!(!restored.is_group());
        assert!(!restored.is_file());
        assert_eq!(restored.text_body(), "olá");
        assert_eq!(restored.content.mime_type, TEXT_MIME_TYPE);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Payload::from_bytes(b"garbage").is_err());
        assert!(Payload::from_bytes(&[0xff; 64]).is_err());
        assert!(Payload::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_bad_date_uses_receipt_time() {
        let mut payload = Payload::text("bob", Recipient::User("alice".into()), &now(), "hi");
        payload.date = "31/31/2025 at 99:99".into();

        let before = now() - chrono::Duration::seconds(1);
        assert!(payload.timestamp() >= before);
    }

    #[test]
    fn test_address_into_recipient() {
        assert_eq!(
            Recipient::from(Address::Group("ops".into())),
            Recipient::Group("ops".into())
        );
        assert_eq!(
            Recipient::from(Address::User("eve".into())),
            Recipient::User("eve".into())
        );
    }
}
