//! Shared data types for msgcode-terminal.

use serde::{Deserialize, Serialize};

/// Result returned by `TerminalManager::exec` — the `bash` tool's
/// underlying execution primitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    /// Process exit code (0 = success).
    pub exit_code: i32,

    /// Captured standard output (ANSI escapes already stripped).
    pub stdout: String,

    /// Captured standard error (ANSI escapes already stripped).
    pub stderr: String,
}

/// Configuration knobs for `bash` tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Directory the command runs in — always the request's `workspacePath`.
    pub cwd: String,

    /// Timeout in milliseconds. The child is killed if it runs longer.
    /// Clamped to a maximum of 300 seconds to bound worst-case blocking.
    pub timeout_ms: u64,

    /// Maximum characters in the combined output before truncation.
    pub max_output_chars: usize,

    /// When `true`, the safety checker is bypassed entirely. Only set for
    /// callers that already validated the command through a separate
    /// policy layer (the Tool Bus's confirm-token path).
    pub skip_safety: bool,
}

impl ExecOptions {
    pub fn new(cwd: impl Into<String>) -> Self {
        Self {
            cwd: cwd.into(),
            timeout_ms: 30_000,
            max_output_chars: 30_000,
            skip_safety: false,
        }
    }

    /// Clamp `timeout_ms` to the hard maximum (300s). Called internally
    /// before spawning so callers cannot accidentally set a multi-hour
    /// timeout.
    pub(crate) fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms.min(300_000)
    }
}

/// Outcome of a Client Pipeline reply collection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyFraming {
    pub success: bool,
    pub partial: bool,
    pub timed_out: bool,
    pub text: String,
}
