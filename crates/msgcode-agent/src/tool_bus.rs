//! Tool Bus: policy gate, confirm-token registry, executor
//! dispatch, structured telemetry. `desktop.confirm.issue` is handled here
//! rather than forwarded to the pooled desktop host, but the registry it
//! issues/validates against is the Session Pool's own per-spawn registry
//! (`SessionPool::ensure_confirm_registry`), not a bus-local one — a
//! desktop-host crash/respawn mints a fresh per-session registry, and a
//! token issued before the respawn needs to stop validating. Every other
//! destructive tool (`write_file`, `edit_file`, `bash`) has no subprocess
//! session to scope to, so those still validate against the bus's own
//! process-lifetime registry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use msgcode_core::config::{PolicySection, ToolingSection};
use msgcode_core::types::{PolicyMode, TurnSource};
use msgcode_hooks::{HookContext, HookEngine, HookEvent};
use msgcode_sessionpool::{ConfirmTokenRegistry, PoolKey, SessionPool};

use crate::tools::{EgressClass, Tool, ToolResult};

const DESKTOP_SESSION_KIND: &str = "desktop";

const DESKTOP_CONFIRM_ISSUE: &str = "desktop.confirm.issue";

/// Desktop methods that only read state — no confirm token required.
const DESKTOP_READ_ONLY: &[&str] = &[
    "desktop.ping",
    "desktop.doctor",
    "desktop.observe",
    "desktop.find",
    "desktop.waitUntil",
    "desktop.listModals",
    "desktop.health",
];

/// What the caller wants to run: a tool name, an optional sub-method (only
/// meaningful for `desktop`, which multiplexes several JSON-RPC methods
/// behind one tool), the call's own parameters, and an optional confirm
/// token authorizing a destructive call.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub tool: String,
    pub method: Option<String>,
    pub params: Value,
    pub confirm_token: Option<Uuid>,
}

pub struct ToolBus {
    tools: HashMap<String, Box<dyn Tool>>,
    hooks: Arc<HookEngine>,
    confirm: ConfirmTokenRegistry,
    session_id: Uuid,
    session_pool: Arc<SessionPool>,
}

impl ToolBus {
    /// `session_id` should be regenerated every time the runtime (re)starts
    /// so confirm tokens issued in a prior process lifetime fail with
    /// `reason=expired-session`, mirroring the Session Pool's own rule.
    /// `session_pool` is where `desktop` confirm tokens are actually issued
    /// and validated against — see the module doc.
    pub fn new(tools: Vec<Box<dyn Tool>>, hooks: Arc<HookEngine>, session_pool: Arc<SessionPool>) -> Self {
        let session_id = Uuid::new_v4();
        Self {
            tools: tools.into_iter().map(|t| (t.name().to_string(), t)).collect(),
            hooks,
            confirm: ConfirmTokenRegistry::new(session_id),
            session_id,
            session_pool,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn tool_definitions(&self) -> Vec<&dyn Tool> {
        self.tools.values().map(|t| t.as_ref()).collect()
    }

    /// Issue a confirm token for `intent_method`/`intent_params`, for use by
    /// the Command Router's `/desktop confirm` and by the `desktop` tool's
    /// own `desktop.confirm.issue` method. Always desktop-session-scoped —
    /// the only tool this bus gates with a confirm token that has a pooled
    /// subprocess session to scope to is `desktop`.
    pub async fn issue_confirm_token(
        &self,
        workspace_path: &Path,
        intent_method: impl Into<String>,
        intent_params: Value,
        ttl_ms: i64,
    ) -> Result<Value, ToolResult> {
        let key = desktop_pool_key(workspace_path);
        let registry = self.session_pool.ensure_confirm_registry(&key).await.map_err(|e| {
            ToolResult::error("TOOL_EXEC_FAILED", format!("could not reach desktop session: {e}"))
        })?;
        let token = registry.issue(intent_method, intent_params, ttl_ms);
        Ok(serde_json::json!({
            "token": token.token.to_string(),
            "sessionId": token.session_id.to_string(),
            "expiresAt": token.expires_at.to_rfc3339(),
        }))
    }

    pub async fn dispatch(
        &self,
        req: ToolCallRequest,
        tooling: &ToolingSection,
        policy: &PolicySection,
        workspace_path: &Path,
        source: TurnSource,
    ) -> ToolResult {
        let start = Instant::now();
        let result = self.dispatch_inner(&req, tooling, policy, workspace_path).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.hooks.emit_after(HookContext::new(
            HookEvent::ToolResult,
            serde_json::json!({
                "toolName": req.tool,
                "durationMs": duration_ms,
                "errorCode": result.error_code,
                "source": source.to_string(),
            }),
        ));
        info!(
            tool = %req.tool,
            duration_ms,
            error_code = ?result.error_code,
            "tool call completed"
        );
        result
    }

    async fn dispatch_inner(
        &self,
        req: &ToolCallRequest,
        tooling: &ToolingSection,
        policy: &PolicySection,
        workspace_path: &Path,
    ) -> ToolResult {
        let Some(tool) = self.tools.get(req.tool.as_str()) else {
            return ToolResult::error("TOOL_NOT_ALLOWED", format!("unknown tool '{}'", req.tool));
        };

        if !tooling.allow.iter().any(|name| name == &req.tool) {
            return ToolResult::error("TOOL_NOT_ALLOWED", format!("'{}' is not in tooling.allow", req.tool));
        }

        if tool.egress_class() == EgressClass::Network && policy.mode == PolicyMode::LocalOnly {
            return ToolResult::error(
                "TOOL_NOT_ALLOWED",
                format!("'{}' requires network egress but policy.mode is local-only", req.tool),
            );
        }

        // `desktop.confirm.issue` is handled by the bus itself — it never
        // reaches the pooled desktop host.
        if req.tool == "desktop" && req.method.as_deref() == Some(DESKTOP_CONFIRM_ISSUE) {
            return self.handle_confirm_issue(workspace_path, &req.params).await;
        }

        if let Some(intent_method) = self.required_confirm_intent(tool.as_ref(), req) {
            if let Err(result) = self.check_confirm(workspace_path, req, &intent_method).await {
                return result;
            }
        }

        let input = match req.tool.as_str() {
            "desktop" => serde_json::json!({
                "method": req.method,
                "params": req.params,
            }),
            _ => req.params.clone(),
        };

        tool.execute(input, workspace_path).await
    }

    /// The intent method a confirm token must match for this call, or
    /// `None` if the call doesn't need one. `write_file`/`edit_file`/`bash`
    /// are destructive outright; `desktop` only for its mutating methods.
    fn required_confirm_intent(&self, tool: &dyn Tool, req: &ToolCallRequest) -> Option<String> {
        if !tool.is_destructive() {
            return None;
        }
        if req.tool == "desktop" {
            let method = req.method.clone().unwrap_or_default();
            if DESKTOP_READ_ONLY.contains(&method.as_str()) {
                return None;
            }
            Some(method)
        } else {
            Some(req.tool.clone())
        }
    }

    async fn check_confirm(
        &self,
        workspace_path: &Path,
        req: &ToolCallRequest,
        intent_method: &str,
    ) -> Result<(), ToolResult> {
        let Some(token) = req.confirm_token else {
            return Err(ToolResult::error(
                "DESKTOP_CONFIRM_REQUIRED",
                format!("{intent_method} requires a confirm token from desktop.confirm.issue"),
            ));
        };
        if req.tool == "desktop" {
            let key = desktop_pool_key(workspace_path);
            let registry = self.session_pool.ensure_confirm_registry(&key).await.map_err(|e| {
                ToolResult::error("TOOL_EXEC_FAILED", format!("could not reach desktop session: {e}"))
            })?;
            let session_id = registry.session_id();
            registry
                .validate_and_consume(token, session_id, intent_method, &req.params)
                .map_err(|failure| {
                    ToolResult::error("DESKTOP_CONFIRM_REQUIRED", format!("reason={}", failure.reason()))
                })
        } else {
            self.confirm
                .validate_and_consume(token, self.session_id, intent_method, &req.params)
                .map_err(|failure| {
                    ToolResult::error("DESKTOP_CONFIRM_REQUIRED", format!("reason={}", failure.reason()))
                })
        }
    }

    async fn handle_confirm_issue(&self, workspace_path: &Path, params: &Value) -> ToolResult {
        let Some(intent_method) = params.get("intentMethod").and_then(|v| v.as_str()) else {
            return ToolResult::error("TOOL_ARG_INVALID", "missing params.intentMethod");
        };
        let intent_params = params.get("intentParams").cloned().unwrap_or(Value::Null);
        let ttl_ms = params.get("ttlMs").and_then(|v| v.as_i64()).unwrap_or(60_000);
        match self.issue_confirm_token(workspace_path, intent_method, intent_params, ttl_ms).await {
            Ok(token) => ToolResult::success(token.to_string()),
            Err(result) => result,
        }
    }
}

fn desktop_pool_key(workspace_path: &Path) -> PoolKey {
    PoolKey::new(workspace_path.to_string_lossy().to_string(), DESKTOP_SESSION_KIND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::desktop::DesktopTool;
    use crate::tools::write_file::WriteFileTool;

    /// Writes a shell script standing in for the desktop host: it ignores
    /// its argv and echoes an OK `SessionResponse` for every NDJSON request
    /// line it reads, preserving the request `id`.
    fn fake_desktop_bin(dir: &tempfile::TempDir) -> String {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("fake-desktop.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "#!/bin/sh\nwhile IFS= read -r line; do\n  id=$(printf '%s' \"$line\" | sed -n 's/.*\"id\":\"\\([^\"]*\\)\".*/\\1/p')\n  printf '{{\"id\":\"%s\",\"exit_code\":0,\"stdout\":\"ok\",\"stderr\":\"\"}}\\n' \"$id\"\ndone\n"
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn bus() -> ToolBus {
        ToolBus::new(
            vec![Box::new(WriteFileTool)],
            Arc::new(HookEngine::new()),
            Arc::new(SessionPool::new("/bin/false")),
        )
    }

    #[tokio::test]
    async fn unlisted_tool_is_rejected() {
        let bus = bus();
        let dir = tempfile::tempdir().unwrap();
        let mut tooling = ToolingSection::default();
        tooling.allow = vec!["read_file".to_string()];
        let result = bus
            .dispatch(
                ToolCallRequest {
                    tool: "write_file".to_string(),
                    method: None,
                    params: serde_json::json!({"path": "a.txt", "content": "x"}),
                    confirm_token: None,
                },
                &tooling,
                &PolicySection::default(),
                dir.path(),
                TurnSource::User,
            )
            .await;
        assert_eq!(result.error_code.as_deref(), Some("TOOL_NOT_ALLOWED"));
    }

    #[tokio::test]
    async fn destructive_tool_without_confirm_token_is_rejected() {
        let bus = bus();
        let dir = tempfile::tempdir().unwrap();
        let result = bus
            .dispatch(
                ToolCallRequest {
                    tool: "write_file".to_string(),
                    method: None,
                    params: serde_json::json!({"path": "a.txt", "content": "x"}),
                    confirm_token: None,
                },
                &ToolingSection::default(),
                &PolicySection::default(),
                dir.path(),
                TurnSource::User,
            )
            .await;
        assert_eq!(result.error_code.as_deref(), Some("DESKTOP_CONFIRM_REQUIRED"));
    }

    #[tokio::test]
    async fn valid_confirm_token_authorizes_exactly_one_desktop_call() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_desktop_bin(&dir);
        let pool = Arc::new(SessionPool::new(bin));
        let bus = ToolBus::new(
            vec![Box::new(DesktopTool::new(pool.clone()))],
            Arc::new(HookEngine::new()),
            pool,
        );
        let mut tooling = ToolingSection::default();
        tooling.allow = vec!["desktop".to_string()];

        let params = serde_json::json!({"text": "hi"});
        let issued = bus
            .issue_confirm_token(dir.path(), "desktop.typeText", params.clone(), 60_000)
            .await
            .unwrap();
        let token = Uuid::parse_str(issued["token"].as_str().unwrap()).unwrap();

        let req = ToolCallRequest {
            tool: "desktop".to_string(),
            method: Some("desktop.typeText".to_string()),
            params: params.clone(),
            confirm_token: Some(token),
        };
        let first = bus
            .dispatch(req.clone(), &tooling, &PolicySection::default(), dir.path(), TurnSource::User)
            .await;
        assert!(!first.is_error);

        let second = bus
            .dispatch(req, &tooling, &PolicySection::default(), dir.path(), TurnSource::User)
            .await;
        assert_eq!(second.error_code.as_deref(), Some("DESKTOP_CONFIRM_REQUIRED"));
    }
}
