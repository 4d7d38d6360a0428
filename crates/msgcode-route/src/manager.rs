use std::path::{Path, PathBuf};

use tracing::instrument;

use msgcode_core::error::{Result, RuntimeError};
use msgcode_core::pathguard::resolve_within_root;
use msgcode_core::types::RuntimeKind;

use crate::store::JsonTable;
use crate::types::{ChatState, RouteEntry, RouteStatus};

/// `get`/`put`/`delete`/`list` over chat → workspace bindings. The only
/// writer of `routes.json`; every reader gets an owned clone, never a
/// reference into the live table.
pub struct RouteStore {
    table: JsonTable<RouteEntry>,
    workspace_root: PathBuf,
}

impl RouteStore {
    pub fn open(config_dir: &Path, workspace_root: PathBuf) -> Result<Self> {
        Ok(Self {
            table: JsonTable::open(config_dir.join("routes.json"))?,
            workspace_root,
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, chat_id: &str) -> Result<Option<RouteEntry>> {
        self.table.get(chat_id)
    }

    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<RouteEntry>> {
        Ok(self.table.list()?.into_iter().map(|(_, v)| v).collect())
    }

    /// Bind `chat_id` to `workspace_path`. Validates that the resolved path
    /// stays inside `workspace_root`, and archives any prior active entry
    /// for the same chat so at most one active entry exists per chat.
    #[instrument(skip(self))]
    pub fn bind(
        &self,
        chat_id: &str,
        workspace_path: &str,
        runtime_kind: RuntimeKind,
        label: Option<String>,
    ) -> Result<RouteEntry> {
        let resolved = resolve_within_root(&self.workspace_root, Path::new(workspace_path))?;

        if let Some(mut existing) = self.table.get(chat_id)? {
            if existing.is_active() {
                existing.status = RouteStatus::Archived;
                existing.updated_at = chrono::Utc::now();
                self.table.put(chat_id.to_string(), existing)?;
            }
        }

        let mut entry = RouteEntry::new(
            chat_id.to_string(),
            resolved.display().to_string(),
            runtime_kind,
        );
        entry.label = label;
        self.table.put(chat_id.to_string(), entry.clone())?;
        Ok(entry)
    }

    /// Archive the active binding for `chat_id`. Never removes the row —
    /// history survives on disk unless explicitly purged.
    #[instrument(skip(self))]
    pub fn unbind(&self, chat_id: &str) -> Result<()> {
        let mut entry = self
            .table
            .get(chat_id)?
            .ok_or_else(|| RuntimeError::NotBound {
                chat_id: chat_id.to_string(),
            })?;
        entry.status = RouteStatus::Archived;
        entry.updated_at = chrono::Utc::now();
        self.table.put(chat_id.to_string(), entry)
    }

    #[instrument(skip(self))]
    pub fn purge(&self, chat_id: &str) -> Result<()> {
        self.table.delete(chat_id)
    }
}

/// Per-chat cursor bookkeeping — the only writer of `state.json`.
pub struct StateStore {
    table: JsonTable<ChatState>,
}

impl StateStore {
    pub fn open(config_dir: &Path) -> Result<Self> {
        Ok(Self {
            table: JsonTable::open(config_dir.join("state.json"))?,
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, chat_id: &str) -> Result<ChatState> {
        Ok(self.table.get(chat_id)?.unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub fn advance(
        &self,
        chat_id: &str,
        rowid: i64,
        message_id: String,
        seen_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let mut state = self.table.get(chat_id)?.unwrap_or_default();
        state.advance(rowid, message_id, seen_at);
        self.table.put(chat_id.to_string(), state)
    }

    #[instrument(skip(self))]
    pub fn reset(&self, chat_id: &str) -> Result<()> {
        self.table.put(chat_id.to_string(), ChatState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_stores() -> (RouteStore, tempfile::TempDir, tempfile::TempDir) {
        let config_dir = tempfile::tempdir().unwrap();
        let ws_root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(ws_root.path().join("acme/ops")).unwrap();
        let store = RouteStore::open(config_dir.path(), ws_root.path().to_path_buf()).unwrap();
        (store, config_dir, ws_root)
    }

    #[test]
    fn bind_then_get_returns_active_entry() {
        let (store, _cfg, ws) = new_stores();
        let entry = store
            .bind(
                "chat-1",
                ws.path().join("acme/ops").to_str().unwrap(),
                RuntimeKind::Agent,
                None,
            )
            .unwrap();
        assert!(entry.is_active());
        let fetched = store.get("chat-1").unwrap().unwrap();
        assert_eq!(fetched.chat_id, "chat-1");
    }

    #[test]
    fn rebind_archives_prior_active_entry() {
        let (store, _cfg, ws) = new_stores();
        std::fs::create_dir_all(ws.path().join("acme/second")).unwrap();
        store
            .bind(
                "chat-1",
                ws.path().join("acme/ops").to_str().unwrap(),
                RuntimeKind::Agent,
                None,
            )
            .unwrap();
        let second = store
            .bind(
                "chat-1",
                ws.path().join("acme/second").to_str().unwrap(),
                RuntimeKind::Agent,
                None,
            )
            .unwrap();
        assert!(second.is_active());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn bind_outside_root_rejected() {
        let (store, _cfg, _ws) = new_stores();
        let err = store
            .bind("chat-1", "/etc/passwd", RuntimeKind::Agent, None)
            .unwrap_err();
        assert_eq!(err.code(), "PATH_OUT_OF_ROOT");
    }

    #[test]
    fn unbind_without_binding_returns_not_bound() {
        let (store, _cfg, _ws) = new_stores();
        let err = store.unbind("chat-unknown").unwrap_err();
        assert_eq!(err.code(), "NOT_BOUND");
    }

    #[test]
    fn state_store_cursor_advances_monotonically() {
        let cfg = tempfile::tempdir().unwrap();
        let store = StateStore::open(cfg.path()).unwrap();
        store
            .advance("chat-1", 5, "m5".to_string(), chrono::Utc::now())
            .unwrap();
        store
            .advance("chat-1", 3, "m3".to_string(), chrono::Utc::now())
            .unwrap();
        let state = store.get("chat-1").unwrap();
        assert_eq!(state.last_seen_rowid, 5);
        assert_eq!(state.message_count, 2);
    }

    #[test]
    fn state_store_reset_clears_cursor() {
        let cfg = tempfile::tempdir().unwrap();
        let store = StateStore::open(cfg.path()).unwrap();
        store
            .advance("chat-1", 5, "m5".to_string(), chrono::Utc::now())
            .unwrap();
        store.reset("chat-1").unwrap();
        let state = store.get("chat-1").unwrap();
        assert_eq!(state.last_seen_rowid, 0);
    }
}
