use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Key for a pool entry: `(workspacePath, kind)`. `kind` is an open string
/// (`"desktop"`, `"codex"`, …) so new session kinds don't require a pool
/// code change — only a spawn-argument table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub workspace_path: String,
    pub kind: String,
}

impl PoolKey {
    pub fn new(workspace_path: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            kind: kind.into(),
        }
    }

    fn as_dense(&self) -> String {
        format!("{}\u{0}{}", self.workspace_path, self.kind)
    }
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.workspace_path)
    }
}

/// Internal dense-string form used as a `DashMap` key, since `PoolKey`
/// itself is more convenient for callers to construct.
pub(crate) fn pool_key_str(key: &PoolKey) -> String {
    key.as_dense()
}

/// One NDJSON request/response exchange with a pooled session child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub id: String,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// A single-use, TTL-bound, session-scoped capability authorizing one
/// destructive/UI tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmToken {
    pub token: Uuid,
    pub intent_method: String,
    pub intent_params: Value,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub session_id: Uuid,
}

impl ConfirmToken {
    pub fn issue(method: impl Into<String>, params: Value, ttl_ms: i64, session_id: Uuid) -> Self {
        let issued_at = Utc::now();
        Self {
            token: Uuid::new_v4(),
            intent_method: method.into(),
            intent_params: params,
            issued_at,
            expires_at: issued_at + chrono::Duration::milliseconds(ttl_ms),
            consumed: false,
            session_id,
        }
    }
}

/// Why a confirm-token validation failed — surfaced as
/// `DESKTOP_CONFIRM_REQUIRED` with this reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmFailure {
    NotFound,
    Expired,
    Used,
    ExpiredSession,
    IntentMismatch,
}

impl ConfirmFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            ConfirmFailure::NotFound => "not-found",
            ConfirmFailure::Expired => "expired",
            ConfirmFailure::Used => "used",
            ConfirmFailure::ExpiredSession => "expired-session",
            ConfirmFailure::IntentMismatch => "intent-mismatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_key_dense_form_is_stable() {
        let a = PoolKey::new("/ws/acme", "desktop");
        let b = PoolKey::new("/ws/acme", "desktop");
        assert_eq!(pool_key_str(&a), pool_key_str(&b));
    }

    #[test]
    fn confirm_failure_reasons_match_spec_strings() {
        assert_eq!(ConfirmFailure::Used.reason(), "used");
        assert_eq!(ConfirmFailure::ExpiredSession.reason(), "expired-session");
    }
}
