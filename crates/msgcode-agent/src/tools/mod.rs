//! The canonical tool catalog: `read_file, write_file,
//! edit_file, bash, desktop`. Every tool operates under a request's
//! `workspace_path` — no tool accepts a path that isn't resolved through
//! `msgcode_core::pathguard` first.

pub mod bash;
pub mod desktop;
pub mod edit_file;
pub mod read_file;
pub mod write_file;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::ToolDefinition;

/// Result of executing a tool. `error_code`, when set, is one of the
/// enumerated failure codes the Tool Bus uses for telemetry and for
/// deciding whether the Tool Loop fails short.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            error_code: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
            error_code: Some(code.into()),
        }
    }
}

/// Whether a tool can reach outside the local machine — gated against
/// `policy.mode` by the Tool Bus. None of the canonical five currently do,
/// but the distinction is load-bearing for whatever joins the catalog next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressClass {
    Local,
    Network,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;

    fn egress_class(&self) -> EgressClass {
        EgressClass::Local
    }

    /// Destructive/UI tools require a valid confirm token from the Tool Bus
    /// before `execute` is ever reached.
    fn is_destructive(&self) -> bool {
        false
    }

    async fn execute(&self, input: serde_json::Value, workspace_path: &Path) -> ToolResult;
}

/// The closed catalog, enumerated for `/help`, `/toolstats`, and `/tool
/// allow` listings.
pub fn tool_catalog() -> Vec<(&'static str, &'static str)> {
    vec![
        ("read_file", "Read the contents of a file"),
        ("write_file", "Write content to a file"),
        ("edit_file", "Apply ordered find/replace patches to a file"),
        ("bash", "Run a shell command in the workspace"),
        ("desktop", "Drive the desktop host over the Session Pool"),
    ]
}

pub fn to_definitions(tools: &[Box<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}
