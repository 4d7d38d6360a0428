use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::types::{ConfirmFailure, ConfirmToken};

/// Confirm-token cache scoped to one session's lifetime. A fresh registry
/// is created every time the pool (re)spawns a session, so after a
/// restart all previously issued tokens simply cease to exist — the
/// `reason=expired-session` behavior falls out of that, not a special
/// case check.
pub struct ConfirmTokenRegistry {
    tokens: DashMap<Uuid, ConfirmToken>,
    session_id: Uuid,
}

impl ConfirmTokenRegistry {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            tokens: DashMap::new(),
            session_id,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn issue(&self, method: impl Into<String>, params: Value, ttl_ms: i64) -> ConfirmToken {
        let token = ConfirmToken::issue(method, params, ttl_ms, self.session_id);
        self.tokens.insert(token.token, token.clone());
        token
    }

    /// Validate and, on success, atomically consume `token` against the
    /// given intent. `session_id` is the session the *caller* currently
    /// believes it's talking to — a mismatch against the registry's own
    /// `session_id` means the session was restarted underneath the caller.
    pub fn validate_and_consume(
        &self,
        token: Uuid,
        session_id: Uuid,
        method: &str,
        params: &Value,
    ) -> Result<(), ConfirmFailure> {
        if session_id != self.session_id {
            return Err(ConfirmFailure::ExpiredSession);
        }

        let mut entry = self.tokens.get_mut(&token).ok_or(ConfirmFailure::NotFound)?;
        if entry.consumed {
            return Err(ConfirmFailure::Used);
        }
        if chrono::Utc::now() > entry.expires_at {
            return Err(ConfirmFailure::Expired);
        }
        if entry.intent_method != method || &entry.intent_params != params {
            return Err(ConfirmFailure::IntentMismatch);
        }

        entry.consumed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn issue_then_consume_succeeds_once() {
        let session_id = Uuid::new_v4();
        let registry = ConfirmTokenRegistry::new(session_id);
        let token = registry.issue("desktop.typeText", json!({"text": "hi"}), 60_000);

        registry
            .validate_and_consume(token.token, session_id, "desktop.typeText", &json!({"text": "hi"}))
            .unwrap();

        let err = registry
            .validate_and_consume(token.token, session_id, "desktop.typeText", &json!({"text": "hi"}))
            .unwrap_err();
        assert_eq!(err, ConfirmFailure::Used);
    }

    #[test]
    fn intent_mismatch_is_rejected() {
        let session_id = Uuid::new_v4();
        let registry = ConfirmTokenRegistry::new(session_id);
        let token = registry.issue("desktop.typeText", json!({"text": "hi"}), 60_000);

        let err = registry
            .validate_and_consume(token.token, session_id, "desktop.typeText", &json!({"text": "bye"}))
            .unwrap_err();
        assert_eq!(err, ConfirmFailure::IntentMismatch);
    }

    #[test]
    fn wrong_session_id_is_expired_session() {
        let registry = ConfirmTokenRegistry::new(Uuid::new_v4());
        let token = registry.issue("desktop.typeText", json!({"text": "hi"}), 60_000);

        let err = registry
            .validate_and_consume(token.token, Uuid::new_v4(), "desktop.typeText", &json!({"text": "hi"}))
            .unwrap_err();
        assert_eq!(err, ConfirmFailure::ExpiredSession);
    }

    #[test]
    fn expired_ttl_is_rejected() {
        let session_id = Uuid::new_v4();
        let registry = ConfirmTokenRegistry::new(session_id);
        let token = registry.issue("desktop.typeText", json!({"text": "hi"}), -1);

        let err = registry
            .validate_and_consume(token.token, session_id, "desktop.typeText", &json!({"text": "hi"}))
            .unwrap_err();
        assert_eq!(err, ConfirmFailure::Expired);
    }
}
