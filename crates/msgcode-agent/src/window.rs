//! Conversation window: a bounded per-chat FIFO of recent turns plus an
//! optional rolling summary, feeding the Context Assembler's "window"
//! section. Distinct from the Thread Journal (`msgcode_memory::ThreadJournal`):
//! the journal is an append-only permanent record, this is ephemeral working
//! memory that `/clear` wipes and that never holds long-term memory content.

use std::collections::VecDeque;
use std::sync::RwLock;

use dashmap::DashMap;

const MAX_TURNS: usize = 20;

#[derive(Debug, Clone)]
pub struct WindowTurn {
    pub user_text: String,
    pub assistant_text: String,
}

/// One chat's window state: the FIFO plus an optional summary of turns
/// that have aged out of it.
#[derive(Default)]
struct ChatWindow {
    turns: VecDeque<WindowTurn>,
    summary: Option<String>,
}

/// Per-chat registry of conversation windows, created lazily on first
/// touch. Reads return owned clones so callers never hold a lock across
/// an `.await`.
#[derive(Default)]
pub struct ConversationWindow {
    by_chat: DashMap<String, RwLock<ChatWindow>>,
}

impl ConversationWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed turn, evicting the oldest turn into the rolling
    /// summary once the FIFO exceeds `MAX_TURNS`.
    pub fn push_turn(&self, chat_id: &str, user_text: String, assistant_text: String) {
        let entry = self.by_chat.entry(chat_id.to_string()).or_default();
        let mut window = entry.write().unwrap();
        window.turns.push_back(WindowTurn { user_text, assistant_text });
        while window.turns.len() > MAX_TURNS {
            if let Some(evicted) = window.turns.pop_front() {
                let line = format!("- {}\n", evicted.user_text.lines().next().unwrap_or(""));
                window.summary.get_or_insert_with(String::new).push_str(&line);
            }
        }
    }

    pub fn turns(&self, chat_id: &str) -> Vec<WindowTurn> {
        self.by_chat
            .get(chat_id)
            .map(|w| w.read().unwrap().turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn summary(&self, chat_id: &str) -> Option<String> {
        self.by_chat.get(chat_id).and_then(|w| w.read().unwrap().summary.clone())
    }

    /// `/clear` — drop both the FIFO and the rolling summary for this chat.
    pub fn clear(&self, chat_id: &str) {
        self.by_chat.remove(chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_read_returns_turn_in_order() {
        let window = ConversationWindow::new();
        window.push_turn("chat-1", "hi".to_string(), "hello".to_string());
        window.push_turn("chat-1", "how are you".to_string(), "good".to_string());
        let turns = window.turns("chat-1");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user_text, "hi");
    }

    #[test]
    fn overflow_evicts_oldest_into_summary() {
        let window = ConversationWindow::new();
        for i in 0..(MAX_TURNS + 3) {
            window.push_turn("chat-1", format!("turn {i}"), "ok".to_string());
        }
        assert_eq!(window.turns("chat-1").len(), MAX_TURNS);
        assert!(window.summary("chat-1").is_some());
    }

    #[test]
    fn clear_wipes_turns_and_summary() {
        let window = ConversationWindow::new();
        window.push_turn("chat-1", "hi".to_string(), "hello".to_string());
        window.clear("chat-1");
        assert!(window.turns("chat-1").is_empty());
        assert!(window.summary("chat-1").is_none());
    }
}
