use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use msgcode_core::error::{Result, RuntimeError};

/// A `chatId`-keyed JSON table, persisted atomically to a single file and
/// mirrored in memory. Both the Route Store and State Store are instances
/// of this shape — the only difference is the value type and the file
/// name. Writes serialize the whole table (`tmp` + `fsync` + `rename`);
/// reads are lock-free `DashMap` lookups, reloaded lazily if the backing
/// file's mtime has moved past what this instance last loaded.
pub struct JsonTable<V> {
    path: PathBuf,
    entries: DashMap<String, V>,
    loaded_mtime: std::sync::Mutex<Option<SystemTime>>,
}

impl<V> JsonTable<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    pub fn open(path: PathBuf) -> Result<Self> {
        let table = Self {
            path,
            entries: DashMap::new(),
            loaded_mtime: std::sync::Mutex::new(None),
        };
        table.reload_if_stale()?;
        Ok(table)
    }

    fn file_mtime(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).ok()?.modified().ok()
    }

    /// Reload the in-memory mirror if the file's mtime has advanced since
    /// the last load (or on first open). A missing file is treated as an
    /// empty table, not an error.
    fn reload_if_stale(&self) -> Result<()> {
        let current = self.file_mtime();
        let mut loaded = self.loaded_mtime.lock().unwrap();
        if *loaded == current {
            return Ok(());
        }
        let map: HashMap<String, V> = if self.path.exists() {
            let raw = fs::read_to_string(&self.path)?;
            serde_json::from_str(&raw).map_err(|e| RuntimeError::ConfigInvalid {
                message: format!("{}: {e}", self.path.display()),
            })?
        } else {
            HashMap::new()
        };
        self.entries.clear();
        for (key, value) in map {
            self.entries.insert(key, value);
        }
        *loaded = current;
        debug!(path = %self.path.display(), count = self.entries.len(), "reloaded json table");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<V>> {
        self.reload_if_stale()?;
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    pub fn list(&self) -> Result<Vec<(String, V)>> {
        self.reload_if_stale()?;
        Ok(self
            .entries
            .iter()
            .map(|kv| (kv.key().clone(), kv.value().clone()))
            .collect())
    }

    pub fn put(&self, key: String, value: V) -> Result<()> {
        self.entries.insert(key, value);
        self.flush()
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        self.flush()
    }

    /// Atomic whole-table rewrite: `<file>.tmp`, `fsync`, `rename`.
    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let snapshot: HashMap<String, V> = self
            .entries
            .iter()
            .map(|kv| (kv.key().clone(), kv.value().clone()))
            .collect();
        let body = serde_json::to_string_pretty(&snapshot)?;
        let tmp_path = tmp_path_for(&self.path);
        {
            let file = fs::File::create(&tmp_path)?;
            use std::io::Write;
            let mut file = file;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let mut loaded = self.loaded_mtime.lock().unwrap();
        *loaded = self.file_mtime();
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Self-heal an unparsable timestamp to "now", logging the repair. Used on
/// `RouteEntry` load per the invariant that time fields are always
/// parseable on disk.
pub fn self_heal_timestamp(raw: &str, field: &str, chat_id: &str) -> chrono::DateTime<chrono::Utc> {
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&chrono::Utc),
        Err(_) => {
            warn!(chat_id, field, raw, "unparseable timestamp, healing to now");
            chrono::Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let table: JsonTable<i64> = JsonTable::open(dir.path().join("routes.json")).unwrap();
        table.put("chat-1".to_string(), 42).unwrap();
        assert_eq!(table.get("chat-1").unwrap(), Some(42));
    }

    #[test]
    fn delete_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let table: JsonTable<i64> = JsonTable::open(dir.path().join("state.json")).unwrap();
        table.put("chat-1".to_string(), 7).unwrap();
        table.delete("chat-1").unwrap();
        assert_eq!(table.get("chat-1").unwrap(), None);
    }

    #[test]
    fn reopen_sees_persisted_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        {
            let table: JsonTable<i64> = JsonTable::open(path.clone()).unwrap();
            table.put("chat-1".to_string(), 9).unwrap();
        }
        let table: JsonTable<i64> = JsonTable::open(path).unwrap();
        assert_eq!(table.get("chat-1").unwrap(), Some(9));
    }

    #[test]
    fn missing_file_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let table: JsonTable<BTreeMap<String, i64>> =
            JsonTable::open(dir.path().join("missing.json")).unwrap();
        assert!(table.list().unwrap().is_empty());
    }
}
