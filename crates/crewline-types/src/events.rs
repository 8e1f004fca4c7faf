use serde::{Deserialize, Serialize};

use crate::models::{Message, UserSummary};

/// Events pushed to clients over the WebSocket. The wire envelope is
/// `{"type": "...", ...payload}` (internally tagged, snake_case).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// A message was accepted by the ingestion pipeline. Carries the
    /// persisted row plus a denormalized sender summary so subscribers
    /// need no follow-up lookup.
    MessageSent {
        message: Message,
        sender: UserSummary,
    },

    /// A user started typing in a channel. Ephemeral, never persisted.
    TypingStart { channel_id: i64, user_id: i64 },

    /// A user stopped typing in a channel. Ephemeral, never persisted.
    TypingStop { channel_id: i64, user_id: i64 },

    /// A user's read marker moved. The relay itself is ephemeral; durable
    /// read receipts go through the REST path.
    MessageRead {
        channel_id: i64,
        user_id: i64,
        message_id: i64,
    },

    /// A reaction was added to a message.
    ReactionAdded {
        channel_id: i64,
        message_id: i64,
        user_id: i64,
        kind: String,
    },

    /// A user connected or disconnected. Best-effort, never durable.
    PresenceChanged { user_id: i64, online: bool },
}

impl ChannelEvent {
    /// Channel this event is scoped to. `None` means the event is global
    /// and fans out to every registered connection.
    pub fn channel_id(&self) -> Option<i64> {
        match self {
            Self::MessageSent { message, .. } => Some(message.channel_id),
            Self::TypingStart { channel_id, .. } => Some(*channel_id),
            Self::TypingStop { channel_id, .. } => Some(*channel_id),
            Self::MessageRead { channel_id, .. } => Some(*channel_id),
            Self::ReactionAdded { channel_id, .. } => Some(*channel_id),
            Self::PresenceChanged { .. } => None,
        }
    }

    /// Non-critical events (typing, presence) are the first to go when a
    /// connection's outbound queue overflows.
    pub fn is_critical(&self) -> bool {
        !matches!(
            self,
            Self::TypingStart { .. } | Self::TypingStop { .. } | Self::PresenceChanged { .. }
        )
    }
}

/// Commands sent FROM client TO server over the WebSocket. All are ephemeral
/// relays; anything durable goes through the REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    TypingStart { channel_id: i64 },
    TypingStop { channel_id: i64 },
    MessageRead { channel_id: i64, message_id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_envelope_is_internally_tagged() {
        let event = ChannelEvent::TypingStart {
            channel_id: 1,
            user_id: 21,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "typing_start");
        assert_eq!(json["channel_id"], 1);
        assert_eq!(json["user_id"], 21);
    }

    #[test]
    fn typing_and_presence_are_droppable() {
        assert!(!ChannelEvent::TypingStop { channel_id: 1, user_id: 2 }.is_critical());
        assert!(!ChannelEvent::PresenceChanged { user_id: 2, online: true }.is_critical());
        assert!(
            ChannelEvent::MessageRead {
                channel_id: 1,
                user_id: 2,
                message_id: 3
            }
            .is_critical()
        );
    }

    #[test]
    fn unknown_command_type_is_rejected() {
        let err = serde_json::from_str::<ClientCommand>(r#"{"type":"shrug","channel_id":1}"#);
        assert!(err.is_err());
    }
}
