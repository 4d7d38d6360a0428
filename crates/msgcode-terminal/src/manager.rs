//! `TerminalManager` — the `bash` tool's execution backend.
//!
//! One-shot only: spawn, capture stdout/stderr, enforce a timeout, and
//! truncate oversized output. There is no interactive-PTY or background-job
//! mode here — the `bash` tool is fire-and-forget, and a long-lived
//! interactive shell is instead the Client Pipeline's tmux session
//! (`client_pipeline.rs`).

use tokio::process::Command as AsyncCommand;
use tracing::debug;

use msgcode_core::error::{Result, RuntimeError};

use crate::{safety, truncate, types::{ExecOptions, ExecResult}};

/// Stateless — owns no sessions. Kept as a struct (rather than free
/// functions) so it can be handed around as an `Arc<TerminalManager>`
/// alongside the rest of the Tool Bus's backends.
#[derive(Debug, Default)]
pub struct TerminalManager;

impl TerminalManager {
    pub fn new() -> Self {
        Self
    }

    /// Execute `command` via `sh -c` with safety checking, timeout, and
    /// output truncation. `options.cwd` is always the request's
    /// `workspacePath` — the caller is responsible for path validation.
    pub async fn exec(&self, command: &str, options: ExecOptions) -> Result<ExecResult> {
        debug!(cwd = %options.cwd, "exec: {command}");

        if !options.skip_safety {
            safety::check_command(command).map_err(|reason| RuntimeError::ToolExecFailed {
                message: format!("command blocked: {reason}"),
            })?;
        }

        let timeout_ms = options.effective_timeout_ms();
        let timeout_duration = std::time::Duration::from_millis(timeout_ms);

        let child = AsyncCommand::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&options.cwd)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeError::ToolExecFailed {
                message: format!("spawn failed: {e}"),
            })?;

        let pid = child.id();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let _ = tx.send(child.wait_with_output().await);
        });

        match tokio::time::timeout(timeout_duration, rx).await {
            Ok(Ok(Ok(output))) => {
                let exit_code = output.status.code().unwrap_or(-1);
                let stdout = truncate::truncate_output(
                    &strip_text(&output.stdout),
                    options.max_output_chars,
                );
                let stderr = truncate::truncate_output(
                    &strip_text(&output.stderr),
                    options.max_output_chars,
                );
                Ok(ExecResult { exit_code, stdout, stderr })
            }

            Ok(Ok(Err(e))) => Err(RuntimeError::Io(e)),

            Ok(Err(_recv_err)) => Err(RuntimeError::ToolExecFailed {
                message: "wait task panicked unexpectedly".to_string(),
            }),

            Err(_elapsed) => {
                if let Some(raw_pid) = pid {
                    // Safety: raw_pid is our direct child, still running.
                    #[cfg(unix)]
                    unsafe {
                        libc::kill(raw_pid as libc::pid_t, libc::SIGKILL);
                    }
                    #[cfg(not(unix))]
                    {
                        let _ = std::process::Command::new("taskkill")
                            .args(["/F", "/PID", &raw_pid.to_string()])
                            .output();
                    }
                }
                Err(RuntimeError::ToolTimeout { timeout_ms })
            }
        }
    }
}

/// Strip ANSI escape codes and convert bytes to a UTF-8 string.
fn strip_text(raw: &[u8]) -> String {
    let clean = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&clean).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_captures_stdout_and_exit_code() {
        let mgr = TerminalManager::new();
        let result = mgr.exec("echo hello", ExecOptions::new(".")).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn exec_reports_nonzero_exit_code() {
        let mgr = TerminalManager::new();
        let result = mgr.exec("exit 3", ExecOptions::new(".")).await.unwrap();
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn exec_rejects_denylisted_command() {
        let mgr = TerminalManager::new();
        let result = mgr.exec("rm -rf /", ExecOptions::new(".")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn exec_times_out_long_running_command() {
        let mgr = TerminalManager::new();
        let mut options = ExecOptions::new(".");
        options.timeout_ms = 50;
        let result = mgr.exec("sleep 5", options).await;
        assert!(matches!(result, Err(RuntimeError::ToolTimeout { .. })));
    }
}
