//! msgcode-terminal — the `bash` tool's one-shot execution backend, plus
//! the tmux-driven Client Pipeline for `runtime.kind = client` workspaces.

pub mod client_pipeline;
pub mod manager;
pub mod safety;
pub mod truncate;
pub mod types;

pub use client_pipeline::ClientPipeline;
pub use manager::TerminalManager;
pub use types::{ExecOptions, ExecResult, ReplyFraming};
