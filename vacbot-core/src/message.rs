// ABOUTME: Generic text message exchanged between front-ends and the dispatch engine
// ABOUTME: Platform metadata rides along as a type parameter instead of a subclass

use std::fmt;
use uuid::Uuid;

/// Unique identity of a message inside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A text message with platform-specific metadata.
///
/// The engine never inspects `metadata`; it only moves the message between
/// the front-end and the responder. Terminal front-ends use `()`, chat
/// platforms carry whatever they need to route a reply (chat id, original
/// message id, and so on).
#[derive(Debug, Clone, PartialEq)]
pub struct Message<M = ()> {
    id: MessageId,
    text: String,
    metadata: M,
}

impl<M> Message<M> {
    /// Create a message with a fresh id
    pub fn new(text: impl Into<String>, metadata: M) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            metadata,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Consume the message, returning its text and metadata
    pub fn into_parts(self) -> (String, M) {
        (self.text, self.metadata)
    }

    /// Whether the text has no visible characters
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl<M: Clone> Message<M> {
    /// Build a response to this message. The metadata is copied so the
    /// front-end can route the reply back to where the message came from.
    pub fn reply(&self, text: impl Into<String>) -> Self {
        Self::new(text, self.metadata.clone())
    }
}

impl Message<()> {
    /// Convenience constructor for metadata-less messages
    pub fn text_only(text: impl Into<String>) -> Self {
        Self::new(text, ())
    }
}

impl<M> fmt::Display for Message<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_messages_get_distinct_ids() {
        let a = Message::text_only("hello");
        let b = Message::text_only("hello");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.text(), b.text());
    }

    #[test]
    fn test_reply_keeps_metadata_with_new_identity() {
        let inbound = Message::new("hi", 42_i64);
        let reply = inbound.reply("hello there");

        assert_eq!(reply.text(), "hello there");
        assert_eq!(*reply.metadata(), 42);
        assert_ne!(reply.id(), inbound.id());
    }

    #[test]
    fn test_is_blank() {
        assert!(Message::text_only("   \n\t").is_blank());
        assert!(Message::text_only("").is_blank());
        assert!(!Message::text_only(" a ").is_blank());
    }
}
