use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use msgcode_core::error::Result;
use msgcode_core::types::{ChatId, RuntimeKind};

const TITLE_MAX_CHARS: usize = 24;

/// Tracks which thread file is currently active for each chat, and
/// serializes appends to a given thread so concurrent turns never
/// interleave writes. A thread is forgotten (forcing a fresh one on the
/// next message) by [`ThreadJournal::reset_thread`].
pub struct ThreadJournal {
    threads_dir: PathBuf,
    active: DashMap<String, ActiveThread>,
    write_lock: Mutex<()>,
}

#[derive(Clone)]
struct ActiveThread {
    thread_id: Uuid,
    path: PathBuf,
    next_turn: u64,
}

/// Either the agent provider name or the tmux client name, whichever
/// applies to the chat's current `runtime.kind`.
pub enum RuntimeMeta<'a> {
    Agent { provider: &'a str },
    Client { tmux_client: Option<&'a str> },
}

impl ThreadJournal {
    pub fn open(workspace_path: &Path) -> Result<Self> {
        let threads_dir = workspace_path.join(".msgcode").join("threads");
        std::fs::create_dir_all(&threads_dir)?;
        Ok(Self {
            threads_dir,
            active: DashMap::new(),
            write_lock: Mutex::new(()),
        })
    }

    /// Resolve the thread for `chat_id`, creating a new file if none is
    /// active. `first_user_text` only matters on creation — it seeds the
    /// title.
    pub fn ensure_thread(
        &self,
        chat_id: &ChatId,
        workspace: &str,
        workspace_path: &str,
        first_user_text: &str,
        runtime_kind: RuntimeKind,
        meta: RuntimeMeta<'_>,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        if let Some(existing) = self.active.get(chat_id.as_str()) {
            return Ok(existing.thread_id);
        }

        let thread_id = Uuid::new_v4();
        let title = slugify_title(first_user_text);
        let date = now.format("%Y-%m-%d");
        let path = self.unique_path(&format!("{date}_{title}"));

        let runtime_line = match meta {
            RuntimeMeta::Agent { provider } => format!("agentProvider: {provider}"),
            RuntimeMeta::Client { tmux_client: Some(client) } => format!("tmuxClient: {client}"),
            RuntimeMeta::Client { tmux_client: None } => "tmuxClient: null".to_string(),
        };
        let contents = format!(
            "---\nthreadId: {thread_id}\nchatId: {chat_id}\nworkspace: {workspace}\nworkspacePath: {workspace_path}\ncreatedAt: {created_at}\nruntimeKind: {runtime_kind}\n{runtime_line}\n---\n",
            chat_id = chat_id.as_str(),
            created_at = now.to_rfc3339(),
        );
        std::fs::write(&path, contents)?;

        self.active.insert(
            chat_id.as_str().to_string(),
            ActiveThread {
                thread_id,
                path,
                next_turn: 1,
            },
        );
        Ok(thread_id)
    }

    /// Append one `## Turn N - <ISO>` block. Called after reply success;
    /// a failure here must be logged by the caller and never propagated
    /// into the chat reply path.
    pub fn append_turn(
        &self,
        chat_id: &ChatId,
        user_text: &str,
        assistant_text: &str,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut entry = self
            .active
            .get_mut(chat_id.as_str())
            .ok_or_else(|| msgcode_core::error::RuntimeError::NotBound {
                chat_id: chat_id.as_str().to_string(),
            })?;

        let turn_no = entry.next_turn;
        let block = format!(
            "\n## Turn {turn_no} - {}\n\n### User\n\n{user_text}\n\n### Assistant\n\n{assistant_text}\n",
            ts.to_rfc3339()
        );

        let mut file = std::fs::OpenOptions::new().append(true).open(&entry.path)?;
        file.write_all(block.as_bytes())?;
        file.sync_all()?;

        entry.next_turn += 1;
        Ok(())
    }

    /// Forces a fresh thread (and a fresh title) on the next `ensure_thread`
    /// call for this chat, e.g. on `/clear`.
    pub fn reset_thread(&self, chat_id: &ChatId) {
        self.active.remove(chat_id.as_str());
    }

    fn unique_path(&self, stem: &str) -> PathBuf {
        let mut candidate = self.threads_dir.join(format!("{stem}.md"));
        let mut suffix = 2;
        while candidate.exists() {
            candidate = self.threads_dir.join(format!("{stem}-{suffix}.md"));
            suffix += 1;
        }
        candidate
    }
}

/// Lowercase, whitespace folded to `-`, anything outside `[a-z0-9-]`
/// stripped, truncated to 24 visible characters. Empty after filtering →
/// `untitled`.
fn slugify_title(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .flat_map(|c| c.to_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .take(TITLE_MAX_CHARS)
        .collect();
    let trimmed = folded.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_filters_unsafe_chars_and_truncates() {
        let title = slugify_title("hello/world: what's up? this is long");
        assert!(!title.contains('/'));
        assert!(!title.contains(':'));
        assert!(title.chars().count() <= TITLE_MAX_CHARS);
    }

    #[test]
    fn slugify_empty_text_becomes_untitled() {
        assert_eq!(slugify_title(""), "untitled");
        assert_eq!(slugify_title("???"), "untitled");
    }

    #[test]
    fn ensure_thread_creates_file_with_front_matter() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ThreadJournal::open(dir.path()).unwrap();
        let chat_id = ChatId::from("chat-1");
        let thread_id = journal
            .ensure_thread(
                &chat_id,
                "acme/ops",
                "/workspaces/acme/ops",
                "hello there",
                RuntimeKind::Agent,
                RuntimeMeta::Agent { provider: "lmstudio" },
                Utc::now(),
            )
            .unwrap();

        let again = journal
            .ensure_thread(
                &chat_id,
                "acme/ops",
                "/workspaces/acme/ops",
                "ignored on reuse",
                RuntimeKind::Agent,
                RuntimeMeta::Agent { provider: "lmstudio" },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(thread_id, again);
    }

    #[test]
    fn append_turn_writes_turn_block() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ThreadJournal::open(dir.path()).unwrap();
        let chat_id = ChatId::from("chat-2");
        journal
            .ensure_thread(
                &chat_id,
                "acme/ops",
                "/workspaces/acme/ops",
                "hi",
                RuntimeKind::Agent,
                RuntimeMeta::Agent { provider: "lmstudio" },
                Utc::now(),
            )
            .unwrap();
        journal.append_turn(&chat_id, "hi", "hello!", Utc::now()).unwrap();

        let entry = journal.active.get(chat_id.as_str()).unwrap();
        let contents = std::fs::read_to_string(&entry.path).unwrap();
        assert!(contents.contains("## Turn 1"));
        assert!(contents.contains("### User"));
        assert!(contents.contains("### Assistant"));
    }

    #[test]
    fn reset_thread_forces_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ThreadJournal::open(dir.path()).unwrap();
        let chat_id = ChatId::from("chat-3");
        let first = journal
            .ensure_thread(
                &chat_id,
                "acme/ops",
                "/workspaces/acme/ops",
                "hi",
                RuntimeKind::Agent,
                RuntimeMeta::Agent { provider: "lmstudio" },
                Utc::now(),
            )
            .unwrap();
        journal.reset_thread(&chat_id);
        let second = journal
            .ensure_thread(
                &chat_id,
                "acme/ops",
                "/workspaces/acme/ops",
                "hi",
                RuntimeKind::Agent,
                RuntimeMeta::Agent { provider: "lmstudio" },
                Utc::now(),
            )
            .unwrap();
        assert_ne!(first, second);
    }
}
