//! Client Pipeline: forwards a chat message into a terminal-multiplexer
//! pane bound to the workspace, and reads the reply back either from the
//! external CLI's JSONL transcript or, failing that, a pane capture.
//!
//! Injects nothing — no Soul, no memory, no tool section. The pipeline's
//! only job is faithful forwarding.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use msgcode_core::error::{Result, RuntimeError};

use crate::types::ReplyFraming;

const DEFAULT_CLIENT: &str = "tmux";
const POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Per-session tailing offsets for JSONL transcripts, so repeated polls
/// don't re-scan a file from the start.
pub struct ClientPipeline {
    client_bin: String,
    tail_offsets: Mutex<HashMap<String, u64>>,
}

impl ClientPipeline {
    pub fn new(client_bin: Option<String>) -> Self {
        Self {
            client_bin: client_bin.unwrap_or_else(|| DEFAULT_CLIENT.to_string()),
            tail_offsets: Mutex::new(HashMap::new()),
        }
    }

    fn session_name(workspace_path: &str) -> String {
        let digest = format!("{:x}", md5_like_hash(workspace_path));
        format!("msgcode-{digest}")
    }

    async fn has_session(&self, session: &str) -> Result<bool> {
        let status = Command::new(&self.client_bin)
            .args(["has-session", "-t", session])
            .status()
            .await
            .map_err(|e| RuntimeError::ToolExecFailed { message: e.to_string() })?;
        Ok(status.success())
    }

    async fn new_session(&self, session: &str, cwd: &str) -> Result<()> {
        let status = Command::new(&self.client_bin)
            .args(["new-session", "-d", "-s", session, "-c", cwd])
            .status()
            .await
            .map_err(|e| RuntimeError::ToolExecFailed { message: e.to_string() })?;
        if !status.success() {
            return Err(RuntimeError::ToolExecFailed {
                message: format!("{} new-session failed", self.client_bin),
            });
        }
        Ok(())
    }

    /// Ensure a session exists for `workspace_path`, creating it if needed.
    pub async fn ensure_session(&self, workspace_path: &str) -> Result<String> {
        let session = Self::session_name(workspace_path);
        if !self.has_session(&session).await? {
            self.new_session(&session, workspace_path).await?;
        }
        Ok(session)
    }

    /// Send `text` verbatim via `send-keys -l` (literal mode) plus a
    /// manual escape of control bytes before they reach the subprocess —
    /// belt-and-suspenders on top of `-l`.
    pub async fn send_text(&self, session: &str, text: &str) -> Result<()> {
        let escaped = escape_control_bytes(text);
        let status = Command::new(&self.client_bin)
            .args(["send-keys", "-t", session, "-l", "--", &escaped])
            .status()
            .await
            .map_err(|e| RuntimeError::ToolExecFailed { message: e.to_string() })?;
        if !status.success() {
            return Err(RuntimeError::ToolExecFailed {
                message: format!("{} send-keys failed", self.client_bin),
            });
        }

        let enter = Command::new(&self.client_bin)
            .args(["send-keys", "-t", session, "Enter"])
            .status()
            .await
            .map_err(|e| RuntimeError::ToolExecFailed { message: e.to_string() })?;
        if !enter.success() {
            return Err(RuntimeError::ToolExecFailed {
                message: format!("{} send-keys Enter failed", self.client_bin),
            });
        }
        Ok(())
    }

    async fn capture_pane(&self, session: &str) -> Result<String> {
        let output = Command::new(&self.client_bin)
            .args(["capture-pane", "-t", session, "-p"])
            .output()
            .await
            .map_err(|e| RuntimeError::ToolExecFailed { message: e.to_string() })?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Collect the reply for this turn. Prefers the transcript's JSONL
    /// tail if `transcript_path` is given and non-stale; otherwise falls
    /// back to a pane capture. Polls until `timeout` elapses or an
    /// end-of-turn marker line appears in the transcript.
    pub async fn collect_reply(
        &self,
        session: &str,
        transcript_path: Option<&Path>,
        timeout: Duration,
    ) -> Result<ReplyFraming> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut collected = String::new();
        let mut saw_any = false;

        loop {
            if let Some(path) = transcript_path {
                match self.tail_new_lines(path) {
                    Ok(lines) if !lines.is_empty() => {
                        saw_any = true;
                        for line in &lines {
                            collected.push_str(line);
                            collected.push('\n');
                        }
                        if lines.iter().any(|l| l.contains("\"end_of_turn\":true")) {
                            return Ok(ReplyFraming {
                                success: true,
                                partial: false,
                                timed_out: false,
                                text: collected,
                            });
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "transcript tail failed, falling back to pane capture");
                    }
                }
            }

            if tokio::time::Instant::now() >= deadline {
                if !saw_any {
                    let pane = self.capture_pane(session).await.unwrap_or_default();
                    return Ok(ReplyFraming {
                        success: !pane.trim().is_empty(),
                        partial: false,
                        timed_out: true,
                        text: pane,
                    });
                }
                return Ok(ReplyFraming {
                    success: true,
                    partial: true,
                    timed_out: true,
                    text: collected,
                });
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn tail_new_lines(&self, path: &Path) -> std::io::Result<Vec<String>> {
        let mut offsets = self.tail_offsets.lock().unwrap();
        let key = path.to_string_lossy().into_owned();
        let start_offset = *offsets.get(&key).unwrap_or(&0);

        let mut file = std::fs::File::open(path)?;
        let len = file.metadata()?.len();
        if len < start_offset {
            // File was truncated/rotated — restart from the top.
            offsets.insert(key.clone(), 0);
            return self.tail_new_lines_from(&mut file, 0, &mut offsets, key);
        }
        self.tail_new_lines_from(&mut file, start_offset, &mut offsets, key)
    }

    fn tail_new_lines_from(
        &self,
        file: &mut std::fs::File,
        offset: u64,
        offsets: &mut HashMap<String, u64>,
        key: String,
    ) -> std::io::Result<Vec<String>> {
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let new_offset = offset + buf.len() as u64;
        offsets.insert(key, new_offset);
        Ok(buf.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }
}

/// Strip raw control bytes before sending keystrokes, even though `-l`
/// already makes `tmux` treat the string as literal keystrokes, not a
/// command.
fn escape_control_bytes(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Small non-cryptographic hash for deriving a stable, filesystem-safe
/// tmux session name from a workspace path. Not used for anything
/// security-sensitive — collisions only affect session naming.
fn md5_like_hash(input: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_control_bytes_strips_control_chars_keeps_newline() {
        let input = "hello\u{0007}world\n\tend";
        let escaped = escape_control_bytes(input);
        assert!(!escaped.contains('\u{0007}'));
        assert!(escaped.contains('\n'));
        assert!(escaped.contains('\t'));
    }

    #[test]
    fn session_name_is_stable_for_same_workspace() {
        let a = ClientPipeline::session_name("/workspaces/acme/ops");
        let b = ClientPipeline::session_name("/workspaces/acme/ops");
        assert_eq!(a, b);
    }

    #[test]
    fn session_name_differs_across_workspaces() {
        let a = ClientPipeline::session_name("/workspaces/acme/ops");
        let b = ClientPipeline::session_name("/workspaces/acme/other");
        assert_ne!(a, b);
    }

    #[test]
    fn tail_new_lines_reads_only_appended_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        std::fs::write(&path, "line1\n").unwrap();

        let pipeline = ClientPipeline::new(None);
        let first = pipeline.tail_new_lines(&path).unwrap();
        assert_eq!(first, vec!["line1".to_string()]);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        use std::io::Write;
        writeln!(file, "line2").unwrap();

        let second = pipeline.tail_new_lines(&path).unwrap();
        assert_eq!(second, vec!["line2".to_string()]);
    }
}
