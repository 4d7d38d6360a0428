use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};
use uuid::Uuid;

use msgcode_core::error::{Result, RuntimeError};
use msgcode_protocol::LineCodec;

use crate::confirm::ConfirmTokenRegistry;
use crate::types::{pool_key_str, PoolKey, SessionRequest, SessionResponse};

const DEFAULT_IDLE_MS: u64 = 60_000;

/// One pooled child process plus its NDJSON multiplexing state. A single
/// in-flight request is enforced per session (holding the entry's lock for
/// the whole round trip in `call_once` is what enforces it) — this keeps
/// confirm-token binding simple at the cost of not pipelining requests to
/// the same session.
struct PoolEntry {
    session_id: Uuid,
    child: Child,
    writer: FramedWrite<tokio::process::ChildStdin, LineCodec>,
    reader: FramedRead<tokio::process::ChildStdout, LineCodec>,
    confirm_tokens: Arc<ConfirmTokenRegistry>,
    last_used: tokio::time::Instant,
}

/// Per-`(workspacePath, kind)` long-lived subprocess pool.
pub struct SessionPool {
    entries: DashMap<String, Arc<Mutex<PoolEntry>>>,
    idle_timeout: Duration,
    spawn_bin: String,
}

impl SessionPool {
    pub fn new(spawn_bin: impl Into<String>) -> Self {
        Self {
            entries: DashMap::new(),
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_MS),
            spawn_bin: spawn_bin.into(),
        }
    }

    /// The confirm-token registry for `key`'s session, spawning the session
    /// first if it doesn't exist yet — confirm-token issue can be the very
    /// first call a chat makes against a workspace, before any other
    /// desktop method has forced a spawn.
    pub async fn ensure_confirm_registry(&self, key: &PoolKey) -> Result<Arc<ConfirmTokenRegistry>> {
        let entry = self.ensure_entry(key).await?;
        let guard = entry.lock().await;
        Ok(guard.confirm_tokens.clone())
    }

    async fn spawn_entry(&self, key: &PoolKey) -> Result<Arc<Mutex<PoolEntry>>> {
        let idle_ms = self.idle_timeout.as_millis().to_string();
        let mut child = Command::new(&self.spawn_bin)
            .args(["session", &key.workspace_path, "--idle-ms", &idle_ms, "--kind", &key.kind])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::ToolExecFailed { message: format!("session spawn failed: {e}") })?;

        let stdin = child.stdin.take().ok_or_else(|| RuntimeError::Internal("no stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| RuntimeError::Internal("no stdout".into()))?;
        let session_id = Uuid::new_v4();

        let entry = Arc::new(Mutex::new(PoolEntry {
            session_id,
            child,
            writer: FramedWrite::new(stdin, LineCodec::default()),
            reader: FramedRead::new(stdout, LineCodec::default()),
            confirm_tokens: Arc::new(ConfirmTokenRegistry::new(session_id)),
            last_used: tokio::time::Instant::now(),
        }));

        self.entries.insert(pool_key_str(key), entry.clone());
        debug!(%key, session_id = %session_id, "session pool entry spawned");
        Ok(entry)
    }

    async fn ensure_entry(&self, key: &PoolKey) -> Result<Arc<Mutex<PoolEntry>>> {
        if let Some(existing) = self.entries.get(&pool_key_str(key)) {
            return Ok(existing.clone());
        }
        self.spawn_entry(key).await
    }

    /// Send one request and await its matching response by `id`. On a
    /// stdin-write or read failure, respawns the session and retries the
    /// same request exactly once, per the crash self-heal invariant.
    pub async fn call(&self, key: &PoolKey, method: &str, params: serde_json::Value) -> Result<SessionResponse> {
        let request = SessionRequest {
            id: Uuid::new_v4().to_string(),
            method: method.to_string(),
            params,
        };

        match self.call_once(key, &request).await {
            Ok(response) => Ok(response),
            Err(_first_failure) => {
                warn!(%key, "session call failed, respawning and retrying once");
                self.entries.remove(&pool_key_str(key));
                self.call_once(key, &request).await
            }
        }
    }

    async fn call_once(&self, key: &PoolKey, request: &SessionRequest) -> Result<SessionResponse> {
        let entry = self.ensure_entry(key).await?;
        let mut guard = entry.lock().await;
        guard.last_used = tokio::time::Instant::now();

        let line = serde_json::to_string(request).map_err(RuntimeError::Serialization)?;
        guard
            .writer
            .send(line)
            .await
            .map_err(|e| RuntimeError::ToolExecFailed { message: format!("write failed: {e}") })?;

        loop {
            let line = guard
                .reader
                .next()
                .await
                .ok_or_else(|| RuntimeError::ToolExecFailed { message: "session closed".into() })?
                .map_err(|e| RuntimeError::ToolExecFailed { message: format!("read failed: {e}") })?;

            let response: SessionResponse =
                serde_json::from_str(&line).map_err(RuntimeError::Serialization)?;

            if response.id == request.id {
                return Ok(response);
            }
            warn!(id = %response.id, expected = %request.id, "dropping response with mismatched id");
        }
    }

    /// Drop any pool entry idle past `idle_timeout`, letting the child exit.
    /// Intended to be driven by a periodic background task.
    pub async fn reap_idle(&self) {
        let mut stale = Vec::new();
        for item in self.entries.iter() {
            let guard = item.value().lock().await;
            if guard.last_used.elapsed() > self.idle_timeout {
                stale.push(item.key().clone());
            }
        }
        for key in stale {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// Writes a shell script standing in for the `session` subcommand: it
    /// ignores its argv and just echoes an OK `SessionResponse` for every
    /// NDJSON request line it reads, preserving the request `id`.
    fn fake_session_bin(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("fake-session.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "#!/bin/sh\nwhile IFS= read -r line; do\n  id=$(printf '%s' \"$line\" | sed -n 's/.*\"id\":\"\\([^\"]*\\)\".*/\\1/p')\n  printf '{{\"id\":\"%s\",\"exit_code\":0,\"stdout\":\"ok\",\"stderr\":\"\"}}\\n' \"$id\"\ndone\n"
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn call_round_trips_through_fake_session() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_session_bin(&dir);
        let pool = SessionPool::new(bin);
        let key = PoolKey::new("/ws/acme", "desktop");

        let response = pool.call(&key, "ping", serde_json::json!({})).await.unwrap();
        assert_eq!(response.stdout, "ok");
        assert_eq!(response.exit_code, Some(0));
    }

    #[tokio::test]
    async fn ensure_confirm_registry_spawns_session_on_first_call() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_session_bin(&dir);
        let pool = SessionPool::new(bin);
        let key = PoolKey::new("/ws/acme", "desktop");

        let registry = pool.ensure_confirm_registry(&key).await;
        assert!(registry.is_ok());
    }

    #[tokio::test]
    async fn ensure_confirm_registry_is_scoped_to_spawned_session() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_session_bin(&dir);
        let pool = SessionPool::new(bin);
        let key = PoolKey::new("/ws/acme", "desktop");

        pool.call(&key, "ping", serde_json::json!({})).await.unwrap();
        let registry = pool.ensure_confirm_registry(&key).await;
        assert!(registry.is_ok());
    }

    #[tokio::test]
    async fn reap_idle_drops_entries_past_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_session_bin(&dir);
        let mut pool = SessionPool::new(bin);
        pool.idle_timeout = Duration::from_millis(1);
        let key = PoolKey::new("/ws/acme", "desktop");

        pool.call(&key, "ping", serde_json::json!({})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.reap_idle().await;
        assert!(!pool.entries.contains_key(&pool_key_str(&key)));
    }
}
