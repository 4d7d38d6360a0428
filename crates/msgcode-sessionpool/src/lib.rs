//! Session Pool: per-`(workspacePath, kind)` long-lived subprocess pool
//! multiplexing NDJSON request/response, plus the confirm-token registry
//! scoped to each pooled session's lifetime.

pub mod confirm;
pub mod pool;
pub mod types;

pub use confirm::ConfirmTokenRegistry;
pub use pool::SessionPool;
pub use types::{ConfirmFailure, ConfirmToken, PoolKey, SessionRequest, SessionResponse};
