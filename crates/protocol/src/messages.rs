use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message between a landlord and a tenant (or an admin).
///
/// `client_id` is generated by the sender so the UI can reconcile its
/// optimistic copy with the broker echo. `id` is assigned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub client_id: String,
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Creates an outgoing message stamped with a fresh client id.
    pub fn outgoing(
        room_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            client_id: uuid::Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            sent_at: Utc::now(),
        }
    }
}

/// Typing indicator for a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub room_id: String,
    pub user_id: String,
    pub typing: bool,
}

/// Marks every message up to `message_id` as read by `reader_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub room_id: String,
    pub message_id: i64,
    pub reader_id: String,
    pub read_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_uses_camel_case() {
        let msg = ChatMessage::outgoing("room-1", "tenant-7", "Is the flat still free?");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["roomId"], "room-1");
        assert_eq!(json["senderId"], "tenant-7");
        assert!(json["clientId"].is_string());
        assert!(json.get("id").is_none());
        assert!(json["sentAt"].is_string());
    }

    #[test]
    fn outgoing_messages_get_distinct_client_ids() {
        let a = ChatMessage::outgoing("r", "u", "a");
        let b = ChatMessage::outgoing("r", "u", "b");
        assert_ne!(a.client_id, b.client_id);
    }

    #[test]
    fn chat_message_from_server_echo() {
        let json = r#"{
            "id": 981,
            "clientId": "c-1",
            "roomId": "room-1",
            "senderId": "landlord-2",
            "content": "Yes, viewing on Friday?",
            "sentAt": "2024-05-01T10:00:00Z"
        }"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, Some(981));
        assert_eq!(msg.sender_id, "landlord-2");
    }

    #[test]
    fn typing_and_read_receipt_shapes() {
        let typing: TypingIndicator =
            serde_json::from_str(r#"{"roomId":"r","userId":"u","typing":true}"#).unwrap();
        assert!(typing.typing);

        let receipt: ReadReceipt = serde_json::from_str(
            r#"{"roomId":"r","messageId":5,"readerId":"u","readAt":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(receipt.message_id, 5);
    }
}
