//! Gateway event and outbound message types.
//!
//! Every inbound event is a [`GatewayEvent`]: a name plus a JSON payload.
//! The framework only interprets one payload shape itself, the chat
//! [`MessagePayload`] carried by [`names::MESSAGE`] events; all other payloads
//! are handed to listeners untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known event names.
pub mod names {
    /// A chat message was created. Payload: [`MessagePayload`](super::MessagePayload).
    pub const MESSAGE: &str = "message";
    /// The gateway finished its initial connection.
    pub const READY: &str = "ready";
    /// The gateway resumed a dropped session.
    pub const RESUMED: &str = "resumed";
    /// The gateway lost its connection unexpectedly.
    pub const DISCONNECT: &str = "disconnect";
    /// A command finished without error. Emitted by the dispatcher.
    pub const COMMAND_COMPLETION: &str = "command_completion";
    /// A command failed. Emitted by the dispatcher.
    pub const COMMAND_ERROR: &str = "command_error";
}

// ============================================================================
// Inbound
// ============================================================================

/// A single inbound event from the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// Event name, e.g. `"message"` or `"raw_reaction_add"`.
    pub name: String,
    /// Raw event payload.
    #[serde(default)]
    pub payload: Value,
}

impl GatewayEvent {
    /// Creates an event with an arbitrary payload.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Creates a `message` event.
    pub fn message(message: &MessagePayload) -> Self {
        let payload = serde_json::to_value(message).unwrap_or(Value::Null);
        Self::new(names::MESSAGE, payload)
    }

    /// Returns `true` when this is a chat message event.
    pub fn is_message(&self) -> bool {
        self.name == names::MESSAGE
    }

    /// Decodes the payload as a chat message.
    ///
    /// Returns `None` for non-message events and for malformed payloads.
    pub fn as_message(&self) -> Option<MessagePayload> {
        if !self.is_message() {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// The author of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    /// Messages from bot accounts never trigger commands.
    #[serde(default)]
    pub bot: bool,
}

/// Payload of a [`names::MESSAGE`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: u64,
    pub author: Author,
    pub channel_id: u64,
    /// `None` for direct messages.
    #[serde(default)]
    pub guild_id: Option<u64>,
    pub content: String,
}

impl MessagePayload {
    /// Returns `true` when the message was sent in a direct-message channel.
    pub fn is_direct(&self) -> bool {
        self.guild_id.is_none()
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// A message the bot wants to post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub channel_id: u64,
    pub content: String,
    /// Message id this one replies to, if any.
    #[serde(default)]
    pub reply_to: Option<u64>,
}

impl OutgoingMessage {
    /// Creates a plain message to `channel_id`.
    pub fn new(channel_id: u64, content: impl Into<String>) -> Self {
        Self {
            channel_id,
            content: content.into(),
            reply_to: None,
        }
    }

    /// Creates a message posted in the same channel as `message`.
    pub fn reply(message: &MessagePayload, content: impl Into<String>) -> Self {
        Self {
            channel_id: message.channel_id,
            content: content.into(),
            reply_to: Some(message.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MessagePayload {
        MessagePayload {
            id: 10,
            author: Author {
                id: 1,
                name: "ann".into(),
                bot: false,
            },
            channel_id: 7,
            guild_id: Some(3),
            content: "!ping".into(),
        }
    }

    #[test]
    fn message_event_decodes_its_payload() {
        let event = GatewayEvent::message(&sample());
        assert!(event.is_message());
        assert_eq!(event.as_message(), Some(sample()));
    }

    #[test]
    fn non_message_events_do_not_decode() {
        let event = GatewayEvent::new("raw_reaction_add", serde_json::json!({"id": 1}));
        assert!(event.as_message().is_none());
    }

    #[test]
    fn reply_targets_the_original_channel() {
        let reply = OutgoingMessage::reply(&sample(), "Pong.");
        assert_eq!(reply.channel_id, 7);
        assert_eq!(reply.reply_to, Some(10));
    }
}
