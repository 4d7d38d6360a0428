use serde::Deserialize;
use serde_json::{json, Value};

use crate::provider::{
    ChatRequest, ChatResponse, LlmProvider, ProviderAdapter, ProviderError, Role, ToolCall, Turn,
};

/// HTTP client for the OpenAI-compatible chat-completions surface. Every
/// known provider (`registry.rs`) speaks this shape, so one client type
/// covers all of them — only `base_url`/`chat_path`/`api_key` differ.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    provider_name: String,
    chat_path: String,
}

impl OpenAiProvider {
    pub fn new(provider_name: impl Into<String>, api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self::with_path(provider_name, api_key, base_url, "/chat/completions")
    }

    pub fn with_path(
        provider_name: impl Into<String>,
        api_key: Option<String>,
        base_url: impl Into<String>,
        chat_path: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into(),
            provider_name: provider_name.into(),
            chat_path: chat_path.into(),
        }
    }

    pub async fn request_embedding(&self, model: &str, input: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(&json!({
            "model": model,
            "input": input,
        }));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }
        let body: EmbeddingResponse = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Parse("empty embeddings response".into()))
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), self.chat_path);
        let body = OpenAiCompatAdapter::build_chat_completion_request(req);

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;

        if resp.status().as_u16() == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(1000);
            return Err(ProviderError::RateLimited { retry_after_ms });
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let value: Value = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        OpenAiCompatAdapter::parse_chat_completion_response(&value)
    }
}

/// Stateless implementation of the three provider-adapter functions for the
/// OpenAI-compatible chat-completions surface — the only in-scope provider
/// kind. Kept free of `&self` so each function is independently testable.
pub struct OpenAiCompatAdapter;

impl ProviderAdapter for OpenAiCompatAdapter {
    fn build_chat_completion_request(req: &ChatRequest) -> Value {
        let mut messages = Vec::new();
        if !req.system.is_empty() {
            messages.push(json!({"role": "system", "content": req.system}));
        }
        for turn in &req.turns {
            match turn {
                Turn::Message(msg) => {
                    messages.push(json!({
                        "role": role_str(msg.role),
                        "content": msg.content,
                    }));
                }
                Turn::ToolCalls(calls) => {
                    let tool_calls: Vec<Value> = calls
                        .iter()
                        .map(|c| {
                            json!({
                                "id": c.id,
                                "type": "function",
                                "function": {
                                    "name": c.name,
                                    "arguments": c.input.to_string(),
                                },
                            })
                        })
                        .collect();
                    messages.push(json!({
                        "role": "assistant",
                        "content": Value::Null,
                        "tool_calls": tool_calls,
                    }));
                }
                Turn::ToolResults(results) => {
                    for r in results {
                        messages.push(json!({
                            "role": "tool",
                            "tool_call_id": r.tool_call_id,
                            "name": r.name,
                            "content": r.content,
                        }));
                    }
                }
            }
        }

        let mut body = json!({
            "model": req.model,
            "messages": messages,
            "max_tokens": req.max_tokens,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        },
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }

        body
    }

    fn parse_chat_completion_response(body: &Value) -> Result<ChatResponse, ProviderError> {
        let parsed: ApiResponse =
            serde_json::from_value(body.clone()).map_err(|e| ProviderError::Parse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("no choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let input = serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Null);
                ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    input,
                }
            })
            .collect();

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => "tool_use".to_string(),
            Some(other) => other.to_string(),
            None => "stop".to_string(),
        };

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            model: parsed.model,
            tokens_in: parsed.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
            tokens_out: parsed.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
            stop_reason,
            tool_calls,
        })
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Message, ToolDefinition};

    #[test]
    fn build_request_includes_system_and_tools() {
        let req = ChatRequest {
            model: "llama-3".into(),
            system: "you are helpful".into(),
            turns: vec![Turn::Message(Message {
                role: Role::User,
                content: "hi".into(),
            })],
            max_tokens: 512,
            tools: vec![ToolDefinition {
                name: "read_file".into(),
                description: "reads a file".into(),
                input_schema: json!({"type": "object"}),
            }],
        };
        let body = OpenAiCompatAdapter::build_chat_completion_request(&req);
        assert_eq!(body["model"], "llama-3");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["tools"][0]["function"]["name"], "read_file");
    }

    #[test]
    fn parse_response_maps_tool_calls_finish_reason() {
        let body = json!({
            "model": "llama-3",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {"name": "bash", "arguments": "{\"command\":\"ls\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        });
        let parsed = OpenAiCompatAdapter::parse_chat_completion_response(&body).unwrap();
        assert_eq!(parsed.stop_reason, "tool_use");
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "bash");
        assert_eq!(parsed.tool_calls[0].input["command"], "ls");
    }

    #[test]
    fn parse_response_defaults_finish_reason_to_stop() {
        let body = json!({
            "model": "llama-3",
            "choices": [{"message": {"content": "hello"}, "finish_reason": null}],
        });
        let parsed = OpenAiCompatAdapter::parse_chat_completion_response(&body).unwrap();
        assert_eq!(parsed.stop_reason, "stop");
        assert_eq!(parsed.content, "hello");
    }
}
