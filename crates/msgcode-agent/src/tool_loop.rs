//! Tool Loop: provider-agnostic tool-call orchestration.
//! Drains pending `/steer` interventions between tool calls, routes every
//! tool call through the Tool Bus (never directly through `Tool::execute`),
//! and fails short the moment a tool call returns a structured error — it
//! never promotes a failed call into a fake natural-language summary.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use msgcode_core::config::{PolicySection, ToolingSection};
use msgcode_core::error::{Result, RuntimeError};
use msgcode_core::types::TurnSource;
use msgcode_ingress::ChatIntervention;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, Message, Role, ToolResultMessage, Turn};
use crate::tool_bus::{ToolBus, ToolCallRequest};
use crate::tools::ToolResult;

pub struct ToolLoopOutcome {
    pub response: ChatResponse,
    pub called_tools: Vec<String>,
}

/// Run the provider ↔ tool-call loop until the model stops requesting
/// tools, the iteration ceiling is hit, or a tool call fails.
#[allow(clippy::too_many_arguments)]
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    mut request: ChatRequest,
    tool_bus: &ToolBus,
    tooling: &ToolingSection,
    policy: &PolicySection,
    workspace_path: &Path,
    intervention: &Arc<ChatIntervention>,
    source: TurnSource,
    max_iterations: u32,
    cancel: Option<&CancellationToken>,
) -> Result<ToolLoopOutcome> {
    let mut called_tools = Vec::new();

    for _iteration in 0..max_iterations.max(1) {
        if let Some(cancel) = cancel {
            if cancel.is_cancelled() {
                return Err(RuntimeError::Internal("turn cancelled".to_string()));
            }
        }

        let response = provider
            .send(&request)
            .await
            .map_err(|e| RuntimeError::ProviderError { message: e.to_string() })?;

        if response.tool_calls.is_empty() {
            if response.content.is_empty() {
                return Err(RuntimeError::EmptyResponse);
            }
            return Ok(ToolLoopOutcome { response, called_tools });
        }

        request.turns.push(Turn::ToolCalls(response.tool_calls.clone()));

        let mut results = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            if let Some(steer_text) = intervention.drain_steer() {
                request.turns.push(Turn::Message(Message {
                    role: Role::User,
                    content: format!("[steer] {steer_text}"),
                }));
            }

            called_tools.push(call.name.clone());
            let tool_req = ToolCallRequest {
                tool: call.name.clone(),
                method: call.input.get("method").and_then(|v| v.as_str()).map(String::from),
                params: call.input.clone(),
                confirm_token: call
                    .input
                    .get("confirm")
                    .and_then(|v| v.get("token"))
                    .and_then(|v| v.as_str())
                    .and_then(|s| uuid::Uuid::parse_str(s).ok()),
            };

            let result: ToolResult = tool_bus
                .dispatch(tool_req, tooling, policy, workspace_path, source)
                .await;

            if result.is_error {
                info!(tool = %call.name, error_code = ?result.error_code, "tool loop failing short");
                return Err(RuntimeError::ToolExecFailed { message: result.content });
            }

            results.push(ToolResultMessage {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                content: result.content,
            });
        }
        request.turns.push(Turn::ToolResults(results));
    }

    Err(RuntimeError::Internal(format!(
        "tool loop exceeded max_iterations ({max_iterations})"
    )))
}
