//! A text message travelling through the in-memory queues.
//!
//! # Message Driven Beans
//! This is the `Message` type of [`TextMessageListener`](crate::listener::TextMessageListener):
//! every bean deployed on the sample container receives one `TextMessage` per delivery.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Type-safe identifier for messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl MessageId {
    pub fn next() -> Self {
        Self(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "msg_{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
    pub id: MessageId,
    pub destination: String,
    pub body: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// How many times delivery of this message has failed so far.
    #[serde(default)]
    pub delivery_count: u32,
}

impl TextMessage {
    /// Creates a message for `destination` with a fresh id.
    pub fn new(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: MessageId::next(),
            destination: destination.into(),
            body: body.into(),
            properties: BTreeMap::new(),
            delivery_count: 0,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn is_redelivered(&self) -> bool {
        self.delivery_count > 0
    }
}
