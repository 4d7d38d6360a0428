//! `write_file` — write content to a file under the workspace, creating
//! parent directories as needed. A destructive tool — requires a confirm
//! token from the Tool Bus.

use std::path::Path;

use async_trait::async_trait;

use msgcode_core::pathguard::resolve_within_workspace;

use super::{Tool, ToolResult};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates parent directories if they do not exist. \
         Overwrites the file if it already exists."
    }

    fn is_destructive(&self) -> bool {
        true
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path relative to the workspace root."},
                "content": {"type": "string", "description": "Text content to write into the file."}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: serde_json::Value, workspace_path: &Path) -> ToolResult {
        let path = match input.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::error("TOOL_ARG_INVALID", "missing required parameter: path"),
        };
        let content = match input.get("content").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("TOOL_ARG_INVALID", "missing required parameter: content"),
        };

        let resolved = match resolve_within_workspace(workspace_path, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.code(), e.to_string()),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolResult::error(
                    "TOOL_EXEC_FAILED",
                    format!("failed to create directories for '{path}': {e}"),
                );
            }
        }

        let byte_len = content.len();
        if let Err(e) = std::fs::write(&resolved, content) {
            return ToolResult::error("TOOL_EXEC_FAILED", format!("failed to write '{path}': {e}"));
        }

        ToolResult::success(format!("File written: {byte_len} bytes to '{path}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_file_creating_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool;
        let result = tool
            .execute(
                serde_json::json!({"path": "sub/dir/a.txt", "content": "hello"}),
                dir.path(),
            )
            .await;
        assert!(!result.is_error);
        assert_eq!(std::fs::read_to_string(dir.path().join("sub/dir/a.txt")).unwrap(), "hello");
    }

    #[tokio::test]
    async fn rejects_absolute_path_outside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool;
        let result = tool
            .execute(serde_json::json!({"path": "/etc/passwd", "content": "x"}), dir.path())
            .await;
        assert!(result.is_error);
        assert_eq!(result.error_code.as_deref(), Some("PATH_OUT_OF_ROOT"));
    }
}
