//! Before/After hook registry. Used by the Tool Bus as its policy gate
//! (`HookEvent::ToolCall`/`ToolResult`) and by the Orchestrator for
//! LLM/desktop observability events.

pub mod engine;
pub mod types;

pub use engine::HookEngine;
pub use types::{HookAction, HookContext, HookDefinition, HookEvent, HookHandler, HookResult, HookTiming};
