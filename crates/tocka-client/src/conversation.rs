//! Per-peer conversation history.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use tocka_shared::timestamp::{format_timestamp, now};
use tocka_shared::{Address, Payload, ProtocolError, Recipient};

/// A text message, as sent or as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub producer: String,
    pub consumer: Address,
    pub content: String,
    pub timestamp: NaiveDateTime,
}

impl ChatMessage {
    pub fn new(producer: impl Into<String>, consumer: Address, content: impl Into<String>) -> Self {
        Self::with_timestamp(producer, consumer, content, now())
    }

    pub fn with_timestamp(
        producer: impl Into<String>,
        consumer: Address,
        content: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            producer: producer.into(),
            consumer,
            content: content.into(),
            timestamp,
        }
    }

    pub fn formatted_time(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    pub fn payload(&self) -> Payload {
        Payload::text(
            self.producer.clone(),
            Recipient::from(self.consumer.clone()),
            &self.timestamp,
            &self.content,
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        self.payload().to_bytes()
    }
}

/// Append-only, insertion-ordered message logs keyed by peer.
#[derive(Debug, Default)]
pub struct Conversations {
    logs: HashMap<Address, Vec<ChatMessage>>,
}

impl Conversations {
    pub fn append(&mut self, peer: Address, message: ChatMessage) {
        self.logs.entry(peer).or_default().push(message);
    }

    pub fn log(&self, peer: &Address) -> &[ChatMessage] {
        self.logs.get(peer).map(Vec::as_slice).unwrap_or(&[])
    }
}
