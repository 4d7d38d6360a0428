//! `edit_file` — apply an ordered list of `{oldText, newText}` patches to a
//! file. Each patch is applied against the result of the previous one, so
//! later patches can target text introduced earlier in the same call.
//! A destructive tool — requires a confirm token from the Tool Bus.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use msgcode_core::pathguard::resolve_within_workspace;

use super::{Tool, ToolResult};

#[derive(Debug, Deserialize)]
struct Patch {
    #[serde(rename = "oldText")]
    old_text: String,
    #[serde(rename = "newText")]
    new_text: String,
    #[serde(default)]
    replace_all: bool,
}

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Apply an ordered list of find/replace patches to a file. Each patch's \
         oldText must match exactly (whitespace-sensitive) and uniquely unless \
         replace_all is set. Patches apply in order, each against the result of \
         the previous one."
    }

    fn is_destructive(&self) -> bool {
        true
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path relative to the workspace root."},
                "patches": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "oldText": {"type": "string"},
                            "newText": {"type": "string"},
                            "replace_all": {"type": "boolean"}
                        },
                        "required": ["oldText", "newText"]
                    }
                }
            },
            "required": ["path", "patches"]
        })
    }

    async fn execute(&self, input: serde_json::Value, workspace_path: &Path) -> ToolResult {
        let path = match input.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::error("TOOL_ARG_INVALID", "missing required parameter: path"),
        };
        let patches: Vec<Patch> = match input.get("patches").cloned() {
            Some(v) => match serde_json::from_value(v) {
                Ok(p) => p,
                Err(e) => {
                    return ToolResult::error("TOOL_ARG_INVALID", format!("invalid patches: {e}"))
                }
            },
            None => return ToolResult::error("TOOL_ARG_INVALID", "missing required parameter: patches"),
        };
        if patches.is_empty() {
            return ToolResult::error("TOOL_ARG_INVALID", "patches must be a non-empty array");
        }

        let resolved = match resolve_within_workspace(workspace_path, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.code(), e.to_string()),
        };

        let mut content = match std::fs::read_to_string(&resolved) {
            Ok(c) => c,
            Err(e) => return ToolResult::error("TOOL_EXEC_FAILED", format!("failed to read '{path}': {e}")),
        };

        let mut applied = 0usize;
        for (i, patch) in patches.iter().enumerate() {
            let count = content.matches(patch.old_text.as_str()).count();
            if count == 0 {
                return ToolResult::error(
                    "TOOL_ARG_INVALID",
                    format!("patch {i}: not-found — oldText does not appear in '{path}'"),
                );
            }
            if !patch.replace_all && count > 1 {
                return ToolResult::error(
                    "TOOL_ARG_INVALID",
                    format!(
                        "patch {i}: ambiguous-match — oldText matches {count} times in '{path}'; \
                         add more context or set replace_all"
                    ),
                );
            }
            content = if patch.replace_all {
                content.replace(patch.old_text.as_str(), patch.new_text.as_str())
            } else {
                content.replacen(patch.old_text.as_str(), patch.new_text.as_str(), 1)
            };
            applied += 1;
        }

        let tmp_path = resolved.with_extension("msgcode_edit_tmp");
        if let Err(e) = std::fs::write(&tmp_path, &content) {
            return ToolResult::error("TOOL_EXEC_FAILED", format!("failed to write temp file: {e}"));
        }
        if let Err(e) = std::fs::rename(&tmp_path, &resolved) {
            let _ = std::fs::remove_file(&tmp_path);
            return ToolResult::error("TOOL_EXEC_FAILED", format!("failed to rename temp file: {e}"));
        }

        ToolResult::success(format!("Patched '{path}': applied {applied} patch(es)."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn applies_ordered_patches_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let tool = EditFileTool;
        let result = tool
            .execute(
                serde_json::json!({
                    "path": "a.txt",
                    "patches": [
                        {"oldText": "hello", "newText": "goodbye"},
                        {"oldText": "goodbye world", "newText": "goodbye cruel world"}
                    ]
                }),
                dir.path(),
            )
            .await;
        assert!(!result.is_error);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "goodbye cruel world"
        );
    }

    #[tokio::test]
    async fn reports_not_found_as_structured_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let tool = EditFileTool;
        let result = tool
            .execute(
                serde_json::json!({"path": "a.txt", "patches": [{"oldText": "missing", "newText": "x"}]}),
                dir.path(),
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("not-found"));
    }

    #[tokio::test]
    async fn reports_ambiguous_match_as_structured_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "aa aa").unwrap();
        let tool = EditFileTool;
        let result = tool
            .execute(
                serde_json::json!({"path": "a.txt", "patches": [{"oldText": "aa", "newText": "b"}]}),
                dir.path(),
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("ambiguous-match"));
    }

    #[tokio::test]
    async fn leaves_file_untouched_on_failed_patch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let tool = EditFileTool;
        let _ = tool
            .execute(
                serde_json::json!({
                    "path": "a.txt",
                    "patches": [
                        {"oldText": "hello", "newText": "goodbye"},
                        {"oldText": "nonexistent", "newText": "x"}
                    ]
                }),
                dir.path(),
            )
            .await;
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "hello world");
    }
}
