//! `read_file` — read a file under the workspace, optionally by line range.

use std::path::Path;

use async_trait::async_trait;

use msgcode_core::pathguard::resolve_within_workspace;

use super::{Tool, ToolResult};

const MAX_OUTPUT_CHARS: usize = 30_000;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Optionally limit to a line range with \
         `offset` (1-based first line) and `limit` (number of lines to return)."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path relative to the workspace root."},
                "offset": {"type": "integer", "description": "1-based line number to start reading from (optional)."},
                "limit": {"type": "integer", "description": "Maximum number of lines to return (optional)."}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: serde_json::Value, workspace_path: &Path) -> ToolResult {
        let path = match input.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::error("TOOL_ARG_INVALID", "missing required parameter: path"),
        };

        let resolved = match resolve_within_workspace(workspace_path, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.code(), e.to_string()),
        };

        let content = match std::fs::read_to_string(&resolved) {
            Ok(c) => c,
            Err(e) => return ToolResult::error("TOOL_EXEC_FAILED", format!("failed to read '{path}': {e}")),
        };

        let offset = input
            .get("offset")
            .and_then(|v| v.as_u64())
            .map(|v| v.saturating_sub(1) as usize);
        let limit = input.get("limit").and_then(|v| v.as_u64()).map(|v| v as usize);

        let result = if offset.is_some() || limit.is_some() {
            let start = offset.unwrap_or(0);
            let lines: Vec<&str> = content.lines().skip(start).collect();
            let lines = if let Some(n) = limit { &lines[..n.min(lines.len())] } else { &lines };
            lines.join("\n")
        } else {
            content
        };

        let result = if result.len() > MAX_OUTPUT_CHARS {
            format!(
                "{}\n\n[output truncated at {} characters]",
                &result[..MAX_OUTPUT_CHARS],
                MAX_OUTPUT_CHARS,
            )
        } else {
            result
        };

        ToolResult::success(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_file_within_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "line1\nline2\nline3").unwrap();
        let tool = ReadFileTool;
        let result = tool
            .execute(serde_json::json!({"path": "a.txt"}), dir.path())
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "line1\nline2\nline3");
    }

    #[tokio::test]
    async fn rejects_path_escaping_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool;
        let result = tool
            .execute(serde_json::json!({"path": "../escape.txt"}), dir.path())
            .await;
        assert!(result.is_error);
        assert_eq!(result.error_code.as_deref(), Some("PATH_OUT_OF_ROOT"));
    }

    #[tokio::test]
    async fn honors_offset_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "l1\nl2\nl3\nl4").unwrap();
        let tool = ReadFileTool;
        let result = tool
            .execute(serde_json::json!({"path": "a.txt", "offset": 2, "limit": 2}), dir.path())
            .await;
        assert_eq!(result.content, "l2\nl3");
    }
}
