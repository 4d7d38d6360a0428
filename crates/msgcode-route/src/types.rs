use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use msgcode_core::types::RuntimeKind;

/// A chat's binding to a workspace directory. Stored in `routes.json`
/// keyed by `chatId`; readers only ever see a cloned snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub chat_id: String,
    pub workspace_path: String,
    pub label: Option<String>,
    pub runtime_kind: RuntimeKind,
    pub status: RouteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Active,
    Paused,
    Archived,
}

impl RouteEntry {
    pub fn new(chat_id: String, workspace_path: String, runtime_kind: RuntimeKind) -> Self {
        let now = Utc::now();
        Self {
            chat_id,
            workspace_path,
            label: None,
            runtime_kind,
            status: RouteStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, RouteStatus::Active)
    }
}

/// Per-chat cursor into the transport's message stream. `last_seen_rowid`
/// is the Ingress Loop's non-decreasing watermark; `message_count` only
/// counts messages that were actually enqueued (after dedup), not every
/// row seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatState {
    pub last_seen_rowid: i64,
    pub last_message_id: Option<String>,
    pub last_seen_at: DateTime<Utc>,
    pub message_count: u64,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            last_seen_rowid: 0,
            last_message_id: None,
            last_seen_at: Utc::now(),
            message_count: 0,
        }
    }
}

impl ChatState {
    /// Advance the cursor after a message is enqueued (not after the reply
    /// is sent — a crash mid-turn must not cause a replay of the same
    /// message on restart).
    pub fn advance(&mut self, rowid: i64, message_id: String, seen_at: DateTime<Utc>) {
        if rowid > self.last_seen_rowid {
            self.last_seen_rowid = rowid;
        }
        self.last_message_id = Some(message_id);
        self.last_seen_at = seen_at;
        self.message_count += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
