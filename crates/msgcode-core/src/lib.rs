//! Shared types, configuration, and error kinds used across the msgcode
//! workspace: the currency every other crate passes turns, chats, and
//! results in.

pub mod config;
pub mod error;
pub mod pathguard;
pub mod types;

pub use config::{BudgetSection, ContextSection, RuntimeConfig, ToolLoopSection, WorkspaceConfig};
pub use error::{Result, RuntimeError};
pub use types::{ChatId, PolicyMode, RequestId, RuntimeKind, ToolingMode, TurnSource};
