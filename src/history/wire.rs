//! Outbound (chat-completions style) projection of stored messages.

use crate::types::{Message, Role};

/// Convert one message to its request JSON. Display-only fields (timestamps,
/// group metadata, reasoning, compliance results) are not sent.
pub fn message_to_wire(msg: &Message) -> serde_json::Value {
    let mut out = serde_json::json!({
        "role": msg.role.to_string(),
        "content": msg.content,
    });

    if let Some(name) = &msg.name {
        out["name"] = serde_json::Value::String(name.clone());
    }
    if msg.role == Role::Assistant && msg.has_tool_calls() {
        out["tool_calls"] = serde_json::to_value(&msg.tool_calls).unwrap_or_default();
    }
    if let Some(id) = &msg.tool_call_id {
        out["tool_call_id"] = serde_json::Value::String(id.clone());
    }
    out
}

/// Convert a request view (see
/// [`HistoryStore::request_messages`](super::HistoryStore::request_messages)).
pub fn messages_to_wire(messages: &[Message]) -> Vec<serde_json::Value> {
    messages.iter().map(message_to_wire).collect()
}
