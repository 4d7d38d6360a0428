use std::collections::VecDeque;
use std::sync::Mutex;

use dashmap::DashMap;

/// Per-chat `steer`/`followUp` FIFOs. `steer` is drained mid-turn by the
/// Tool Loop between tool executions; `followUp` is drained by the
/// Orchestrator after a turn completes. Both are plain mutex-guarded
/// deques rather than channels routed through the chat actor: pushes from
/// `/steer` and `/next` (the command router) and drains from the turn
/// handler (running inside the same chat's actor task) never race each
/// other because a chat only ever has one turn in flight at a time.
#[derive(Default)]
pub struct ChatIntervention {
    steer: Mutex<VecDeque<String>>,
    follow_up: Mutex<VecDeque<String>>,
}

impl ChatIntervention {
    pub fn push_steer(&self, text: String) {
        self.steer.lock().unwrap().push_back(text);
    }

    pub fn push_follow_up(&self, text: String) {
        self.follow_up.lock().unwrap().push_back(text);
    }

    /// Drain one pending steer message, if any — called between tool
    /// executions in the Tool Loop.
    pub fn drain_steer(&self) -> Option<String> {
        self.steer.lock().unwrap().pop_front()
    }

    /// Drain one pending follow-up, if any — called after a turn completes.
    pub fn drain_follow_up(&self) -> Option<String> {
        self.follow_up.lock().unwrap().pop_front()
    }

    pub fn has_pending_steer(&self) -> bool {
        !self.steer.lock().unwrap().is_empty()
    }
}

/// Registry of per-chat intervention queues, created lazily on first touch.
#[derive(Default)]
pub struct InterventionRegistry {
    by_chat: DashMap<String, std::sync::Arc<ChatIntervention>>,
}

impl InterventionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, chat_id: &str) -> std::sync::Arc<ChatIntervention> {
        self.by_chat
            .entry(chat_id.to_string())
            .or_insert_with(|| std::sync::Arc::new(ChatIntervention::default()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steer_drains_fifo_order() {
        let q = ChatIntervention::default();
        q.push_steer("first".to_string());
        q.push_steer("second".to_string());
        assert_eq!(q.drain_steer().as_deref(), Some("first"));
        assert_eq!(q.drain_steer().as_deref(), Some("second"));
        assert_eq!(q.drain_steer(), None);
    }

    #[test]
    fn follow_up_independent_from_steer() {
        let q = ChatIntervention::default();
        q.push_follow_up("next".to_string());
        assert!(q.drain_steer().is_none());
        assert_eq!(q.drain_follow_up().as_deref(), Some("next"));
    }

    #[test]
    fn registry_returns_same_queue_for_same_chat() {
        let registry = InterventionRegistry::new();
        let a = registry.get_or_create("chat-1");
        a.push_steer("hi".to_string());
        let b = registry.get_or_create("chat-1");
        assert!(b.has_pending_steer());
    }
}
