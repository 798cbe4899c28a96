//! Gateway traits and the events a channel delivers.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Chat identity of a submitter (or of the reviewer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Who sent an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    /// Session key and reply target.
    pub chat_id: ChatId,
    /// Sender's first name, used only for the greeting.
    pub first_name: Option<String>,
}

impl Submitter {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: ChatId::new(chat_id),
            first_name: None,
        }
    }

    pub fn with_first_name(mut self, name: impl Into<String>) -> Self {
        self.first_name = Some(name.into());
        self
    }
}

/// A document announced by the gateway. The bytes stay remote until fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpload {
    /// Name the submitter gave the file.
    pub file_name: String,
    /// Declared size in bytes.
    pub size_bytes: u64,
    /// Opaque gateway reference (Telegram `file_id`).
    pub file_id: String,
}

/// Typed event kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntakeEvent {
    /// `/start`
    Start,
    /// `/cancel`
    Cancel,
    /// Plain, non-command text.
    Text { text: String },
    /// A shared contact.
    Contact { phone: String },
    /// An uploaded document.
    Document(DocumentUpload),
    /// Anything else (photos, stickers, unknown commands).
    Unsupported { description: String },
}

impl IntakeEvent {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Cancel => "cancel",
            Self::Text { .. } => "text",
            Self::Contact { .. } => "contact",
            Self::Document(_) => "document",
            Self::Unsupported { .. } => "unsupported",
        }
    }
}

/// An event tagged with its submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub submitter: Submitter,
    pub event: IntakeEvent,
}

impl IncomingEvent {
    pub fn new(submitter: Submitter, event: IntakeEvent) -> Self {
        Self { submitter, event }
    }
}

/// Stream of incoming events.
pub type EventStream = Pin<Box<dyn Stream<Item = IncomingEvent> + Send>>;

/// Outbound side of the messaging gateway.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, to: &ChatId, text: &str) -> Result<(), ChannelError>;

    /// Send text with a one-button keyboard that shares the user's phone.
    async fn send_contact_request(
        &self,
        to: &ChatId,
        text: &str,
        button_label: &str,
    ) -> Result<(), ChannelError>;

    /// Send text and remove any custom keyboard.
    async fn remove_keyboard(&self, to: &ChatId, text: &str) -> Result<(), ChannelError>;

    /// Fetch the bytes behind a document reference.
    async fn fetch_document(&self, file_id: &str) -> Result<Vec<u8>, ChannelError>;

    /// Send an already-uploaded document to `to` with a caption.
    async fn forward_document(
        &self,
        to: &ChatId,
        file_id: &str,
        caption: &str,
    ) -> Result<(), ChannelError>;
}

/// Inbound side: a channel that produces events and can also reply.
#[async_trait]
pub trait Channel: Gateway {
    /// Channel name for logs.
    fn name(&self) -> &str;

    /// Start listening; events arrive on the returned stream.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Verify credentials and connectivity.
    async fn health_check(&self) -> Result<(), ChannelError>;

    /// Stop listening.
    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
