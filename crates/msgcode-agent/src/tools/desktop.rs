//! `desktop` — multiplexed over the Session Pool.
//!
//! Confirm-token gating for the mutating methods (`click`, `typeText`,
//! `hotkey`, `dismissModal`, `abort`) and the handling of
//! `desktop.confirm.issue` both happen one layer up, in the Tool Bus —
//! it owns the confirm-token registry for every destructive tool, not
//! just this one. By the time a call reaches `execute` here it has
//! already cleared that gate; this type only speaks JSON-RPC methods to
//! the pooled desktop host.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use msgcode_sessionpool::{PoolKey, SessionPool};

use super::{EgressClass, Tool, ToolResult};

pub struct DesktopTool {
    pool: Arc<SessionPool>,
}

impl DesktopTool {
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Tool for DesktopTool {
    fn name(&self) -> &str {
        "desktop"
    }

    fn description(&self) -> &str {
        "Drive the desktop host: observe the screen, find elements, click, type \
         text, send hotkeys, wait for conditions, and manage modals. Mutating \
         actions require a confirm token obtained from desktop.confirm.issue."
    }

    fn egress_class(&self) -> EgressClass {
        EgressClass::Local
    }

    fn is_destructive(&self) -> bool {
        true
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "method": {
                    "type": "string",
                    "description": "desktop.ping | desktop.doctor | desktop.observe | desktop.find | \
                                     desktop.click | desktop.typeText | desktop.hotkey | desktop.waitUntil | \
                                     desktop.listModals | desktop.dismissModal | desktop.abort | \
                                     desktop.confirm.issue | desktop.health"
                },
                "params": {"type": "object"}
            },
            "required": ["method"]
        })
    }

    async fn execute(&self, input: serde_json::Value, workspace_path: &Path) -> ToolResult {
        let method = match input.get("method").and_then(|v| v.as_str()) {
            Some(m) => m.to_string(),
            None => return ToolResult::error("TOOL_ARG_INVALID", "missing required parameter: method"),
        };
        let params = input.get("params").cloned().unwrap_or(Value::Object(Default::default()));
        let key = PoolKey::new(workspace_path.to_string_lossy().to_string(), "desktop");

        match self.pool.call(&key, &method, params).await {
            Ok(response) => {
                if response.exit_code.is_some() && response.exit_code != Some(0) {
                    ToolResult::error(
                        "TOOL_EXEC_FAILED",
                        serde_json::json!({
                            "exitCode": response.exit_code,
                            "stdout": response.stdout,
                            "stderr": response.stderr,
                        })
                        .to_string(),
                    )
                } else {
                    ToolResult::success(response.stdout)
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
    async fn missing_method_is_arg_invalid() {
        let pool = Arc::new(SessionPool::new("/bin/false"));
        let tool = DesktopTool::new(pool);
        let dir = tempfile::tempdir().unwrap();
        let result = tool.execute(serde_json::json!({}), dir.path()).await;
        assert_eq!(result.error_code.as_deref(), Some("TOOL_ARG_INVALID"));
    }
}
