use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single message in the conversation sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// Tool definition sent to the LLM as part of the chat-completions request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call extracted from the LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// A prior tool result being fed back into the next turn of the loop.
#[derive(Debug, Clone)]
pub struct ToolResultMessage {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
}

/// One exchange already in the running conversation — either a plain
/// message or a tool call/result pair produced by a previous iteration of
/// the Tool Loop.
#[derive(Debug, Clone)]
pub enum Turn {
    Message(Message),
    ToolCalls(Vec<ToolCall>),
    ToolResults(Vec<ToolResultMessage>),
}

/// Request to an LLM provider, assembled by the Context Assembler.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub turns: Vec<Turn>,
    pub max_tokens: u32,
    pub tools: Vec<ToolDefinition>,
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
    pub tool_calls: Vec<ToolCall>,
}

/// The OpenAI-compatible chat-completions surface is the only in-scope
/// provider kind. `build_chat_completion_request` and
/// `parse_chat_completion_response` take no `&self` — they're plain
/// functions reachable as trait associated functions so they're unit
/// testable without constructing an HTTP client.
pub trait ProviderAdapter {
    fn build_chat_completion_request(req: &ChatRequest) -> serde_json::Value;
    fn parse_chat_completion_response(body: &serde_json::Value) -> Result<ChatResponse, ProviderError>;
}

/// Thin HTTP wrapper around a `ProviderAdapter`. Every known provider (see
/// `registry.rs`) is reached through this one trait since they all speak
/// the same chat-completions shape.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}
