use serde::{Deserialize, Serialize};

/// One message as reported by the messaging binary's `list(since)` op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub rowid: i64,
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub ts: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub is_from_me: bool,
}

/// Acknowledgement returned by `send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub delivered: bool,
    pub remote_id: Option<String>,
}

/// Connection status of the transport subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportStatus {
    Connected,
    Connecting,
    Disconnected,
}

/// Payload sent to `send`: either plain text or a file attachment path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundPayload {
    Text(String),
    AttachmentPath(String),
}
