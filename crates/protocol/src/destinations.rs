//! Destination naming for the chat broker.
//!
//! Broker-managed topics live under `/topic`, per-user queues under
//! `/user/queue`, and application handlers under `/app`.

/// Topic carrying new messages for a chat room.
pub fn room_topic(room_id: &str) -> String {
    format!("/topic/chat/{room_id}")
}

/// Topic carrying typing indicators for a chat room.
pub fn typing_topic(room_id: &str) -> String {
    format!("/topic/chat/{room_id}/typing")
}

/// Topic carrying read receipts for a chat room.
pub fn read_receipt_topic(room_id: &str) -> String {
    format!("/topic/chat/{room_id}/read")
}

/// Per-user queue for direct notifications (new conversation, unread count).
pub fn user_queue(name: &str) -> String {
    format!("/user/queue/{name}")
}

/// Application destination that accepts a new chat message.
pub fn send_message(room_id: &str) -> String {
    format!("/app/chat/{room_id}/send")
}

/// Application destination that accepts a typing indicator.
pub fn send_typing(room_id: &str) -> String {
    format!("/app/chat/{room_id}/typing")
}

/// Application destination that accepts a read receipt.
pub fn send_read_receipt(room_id: &str) -> String {
    format!("/app/chat/{room_id}/read")
}
