use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Change notification from the real-time channel.
///
/// Carries no guarantee about its payload: the only safe reaction is to
/// invalidate and re-poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushEvent {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    /// Position within the channel connection that delivered it, from 1.
    pub sequence: u64,
    pub received_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct PushFrame {
    #[serde(alias = "type", alias = "event", alias = "name")]
    kind: String,
    #[serde(default, alias = "data", alias = "args")]
    payload: Value,
}

/// Decodes one inbound text frame.
///
/// Frames that are not `{"event"|"type"|"kind": ..}` objects are kept as
/// `message` events with the raw text as payload.
pub fn decode_push_frame(text: &str, sequence: u64, received_at: DateTime<Utc>) -> PushEvent {
    match serde_json::from_str::<PushFrame>(text) {
        Ok(frame) => PushEvent {
            kind: frame.kind,
            payload: frame.payload,
            sequence,
            received_at,
        },
        Err(_) => PushEvent {
            kind: "message".to_string(),
            payload: Value::String(text.to_string()),
            sequence,
            received_at,
        },
    }
}
