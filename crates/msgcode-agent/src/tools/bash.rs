//! `bash` — run a shell command with `cwd = workspace_path`. A destructive
//! tool — requires a confirm token from the Tool Bus.

use std::path::Path;

use async_trait::async_trait;

use msgcode_terminal::{ExecOptions, TerminalManager};

use super::{Tool, ToolResult};

pub struct BashTool {
    manager: TerminalManager,
}

impl Default for BashTool {
    fn default() -> Self {
        Self {
            manager: TerminalManager::default(),
        }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace directory. Bounded by a timeout; \
         stdout/stderr/exitCode are captured and returned."
    }

    fn is_destructive(&self) -> bool {
        true
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to run."},
                "timeout_ms": {"type": "integer", "description": "Timeout in milliseconds (optional)."}
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: serde_json::Value, workspace_path: &Path) -> ToolResult {
        let command = match input.get("command").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("TOOL_ARG_INVALID", "missing required parameter: command"),
        };

        let mut options = ExecOptions::new(workspace_path.to_string_lossy().to_string());
        if let Some(ms) = input.get("timeout_ms").and_then(|v| v.as_u64()) {
            options.timeout_ms = ms;
        }

        match self.manager.exec(command, options).await {
            Ok(result) => {
                let body = serde_json::json!({
                    "exitCode": result.exit_code,
                    "stdout": result.stdout,
                    "stderr": result.stderr,
                });
                if result.exit_code == 0 {
                    ToolResult::success(body.to_string())
                } else {
                    ToolResult::error("TOOL_EXEC_FAILED", body.to_string())
                }
            }
            Err(e) => ToolResult::error(e.code(), e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_command_in_workspace_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let tool = BashTool::default();
        let result = tool
            .execute(serde_json::json!({"command": "ls"}), dir.path())
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("marker.txt"));
    }

    #[tokio::test]
    async fn missing_command_is_arg_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::default();
        let result = tool.execute(serde_json::json!({}), dir.path()).await;
        assert_eq!(result.error_code.as_deref(), Some("TOOL_ARG_INVALID"));
    }
}
