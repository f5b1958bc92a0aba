//! Wire protocol: closed tagged unions for every inbound and outbound event.
//!
//! Frames are JSON text; the `event` tag carries the event name and the
//! payload fields ride alongside it in camelCase. Dispatch over a closed
//! enum gives compile-time coverage of every event type.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::chat::conversations::ConversationSummary;
use crate::chat::store::StoredMessage;
use crate::db::models::UserIdentity;

/// Events a client may send. Unknown names or malformed payloads fail
/// deserialization and are dropped by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    SendGlobal {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    SendDirect {
        text: String,
        recipient_id: String,
    },
    GetHistory,
    #[serde(rename_all = "camelCase")]
    GetDirectMessages {
        counterpart_id: String,
    },
    #[serde(rename_all = "camelCase")]
    StartConversation {
        recipient_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        recipient_id: String,
        is_typing: bool,
    },
    #[serde(rename_all = "camelCase")]
    MarkRead {
        message_ids: Vec<String>,
        sender_id: String,
    },
    SearchUsers {
        query: String,
    },
    GetConversations,
}

/// Online/offline as carried by `presence-changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// A global-room message as delivered to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: String,
    pub text: String,
    pub created_at: String,
    pub user: UserIdentity,
}

impl From<StoredMessage> for MessagePayload {
    fn from(m: StoredMessage) -> Self {
        Self {
            id: m.id,
            text: m.text,
            created_at: m.created_at,
            user: m.author,
        }
    }
}

/// A direct message as delivered to clients; carries read state so a
/// re-fetch reconciles receipts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessagePayload {
    pub id: String,
    pub text: String,
    pub created_at: String,
    pub user: UserIdentity,
    pub recipient_id: String,
    pub is_read: bool,
    pub read_at: Option<String>,
}

impl From<StoredMessage> for DirectMessagePayload {
    fn from(m: StoredMessage) -> Self {
        Self {
            id: m.id,
            text: m.text,
            created_at: m.created_at,
            user: m.author,
            recipient_id: m.recipient_id.unwrap_or_default(),
            is_read: m.is_read,
            read_at: m.read_at,
        }
    }
}

/// A user search hit with the presence projection attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub username: String,
    pub is_online: bool,
}

/// Events the server emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    PresenceChanged {
        user_id: String,
        status: PresenceStatus,
    },
    OnlineUsers {
        users: Vec<UserIdentity>,
    },
    GlobalMessage(MessagePayload),
    MessageHistory {
        messages: Vec<MessagePayload>,
    },
    DirectMessage(DirectMessagePayload),
    #[serde(rename_all = "camelCase")]
    DirectMessageHistory {
        counterpart_id: String,
        messages: Vec<DirectMessagePayload>,
    },
    Conversations {
        conversations: Vec<ConversationSummary>,
    },
    NewConversation(ConversationSummary),
    #[serde(rename_all = "camelCase")]
    ConversationStarted {
        user_id: String,
        username: String,
        is_online: bool,
    },
    SearchResults {
        users: Vec<SearchHit>,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: String,
        username: String,
        is_typing: bool,
    },
    #[serde(rename_all = "camelCase")]
    MessagesRead {
        message_ids: Vec<String>,
        reader_id: String,
    },
    Error {
        message: String,
    },
}

/// Encode a server event as a text frame. Encoding a static enum cannot
/// realistically fail; if it ever does, the frame is dropped and logged
/// rather than tearing down the connection.
pub(crate) fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_deserialize_from_wire_names() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"send-global","text":"hi"}"#).unwrap();
        assert!(matches!(event, ClientEvent::SendGlobal { text } if text == "hi"));

        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"send-direct","text":"hi","recipientId":"u2"}"#,
        )
        .unwrap();
        assert!(matches!(event, ClientEvent::SendDirect { recipient_id, .. } if recipient_id == "u2"));

        let event: ClientEvent = serde_json::from_str(r#"{"event":"get-history"}"#).unwrap();
        assert!(matches!(event, ClientEvent::GetHistory));

        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"mark-read","messageIds":["m1"],"senderId":"u1"}"#,
        )
        .unwrap();
        assert!(matches!(event, ClientEvent::MarkRead { message_ids, .. } if message_ids == ["m1"]));
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"join-room","room":"x"}"#).is_err());
    }

    #[test]
    fn server_events_serialize_with_wire_names() {
        let json = serde_json::to_string(&ServerEvent::PresenceChanged {
            user_id: "u1".to_string(),
            status: PresenceStatus::Online,
        })
        .unwrap();
        assert!(json.contains(r#""event":"presence-changed""#));
        assert!(json.contains(r#""status":"online""#));
        assert!(json.contains(r#""userId":"u1""#));

        let json = serde_json::to_string(&ServerEvent::UserTyping {
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            is_typing: true,
        })
        .unwrap();
        assert!(json.contains(r#""event":"user-typing""#));
        assert!(json.contains(r#""isTyping":true"#));
    }

    #[test]
    fn global_message_flattens_payload_fields() {
        let payload = MessagePayload {
            id: "m1".to_string(),
            text: "hi".to_string(),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            user: UserIdentity {
                id: "u1".to_string(),
                username: "alice".to_string(),
                message_color: "#1e88e5".to_string(),
            },
        };
        let json = serde_json::to_string(&ServerEvent::GlobalMessage(payload)).unwrap();
        assert!(json.contains(r#""event":"global-message""#));
        assert!(json.contains(r#""createdAt":"2026-01-01T00:00:00.000Z""#));
        assert!(json.contains(r##""messageColor":"#1e88e5""##));
    }
}
