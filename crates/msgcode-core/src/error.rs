use thiserror::Error;

/// Closed set of runtime error kinds, each with a stable string code. Every
/// boundary function returns `Result<T, RuntimeError>`; foreign errors
/// (SQLite, reqwest, I/O) are mapped into this enum at the module boundary
/// that first observes them, never leaked past it as `anyhow::Error`.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("tool not allowed: {tool}")]
    ToolNotAllowed { tool: String },

    #[error("invalid tool arguments: {message}")]
    ToolArgInvalid { message: String },

    #[error("tool timed out after {timeout_ms}ms")]
    ToolTimeout { timeout_ms: u64 },

    #[error("tool execution failed: {message}")]
    ToolExecFailed { message: String },

    #[error("desktop confirm required (reason={reason})")]
    DesktopConfirmRequired { reason: String },

    #[error("desktop permission missing: {message}")]
    DesktopPermissionMissing { message: String },

    #[error("desktop anchor not found: {message}")]
    DesktopAnchorNotFound { message: String },

    #[error("desktop modal is blocking: {message}")]
    DesktopModalBlocking { message: String },

    #[error("desktop call timed out")]
    DesktopTimeout,

    #[error("transport unavailable: {message}")]
    TransportUnavailable { message: String },

    #[error("transport call timed out")]
    TransportTimeout,

    #[error("provider error: {message}")]
    ProviderError { message: String },

    #[error("provider returned no content and no tool calls")]
    EmptyResponse,

    #[error("invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("path resolves outside the workspace root: {path}")]
    PathOutOfRoot { path: String },

    #[error("chat is not bound to a workspace: {chat_id}")]
    NotBound { chat_id: String },

    #[error("sender is not whitelisted: {identity}")]
    NotWhitelisted { identity: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),

    /// Catch-all for a foreign error kind that doesn't map to a known
    /// variant above. Never constructed by this crate's own logic — only
    /// at a boundary translating an unrecognized external failure.
    #[error("unknown error ({code}): {message}")]
    Unknown { code: String, message: String },
}

impl RuntimeError {
    /// Stable string code — what callers see in `{error: {code, message}}`.
    pub fn code(&self) -> &str {
        match self {
            RuntimeError::ToolNotAllowed { .. } => "TOOL_NOT_ALLOWED",
            RuntimeError::ToolArgInvalid { .. } => "TOOL_ARG_INVALID",
            RuntimeError::ToolTimeout { .. } => "TOOL_TIMEOUT",
            RuntimeError::ToolExecFailed { .. } => "TOOL_EXEC_FAILED",
            RuntimeError::DesktopConfirmRequired { .. } => "DESKTOP_CONFIRM_REQUIRED",
            RuntimeError::DesktopPermissionMissing { .. } => "DESKTOP_PERMISSION_MISSING",
            RuntimeError::DesktopAnchorNotFound { .. } => "DESKTOP_ANCHOR_NOT_FOUND",
            RuntimeError::DesktopModalBlocking { .. } => "DESKTOP_MODAL_BLOCKING",
            RuntimeError::DesktopTimeout => "DESKTOP_TIMEOUT",
            RuntimeError::TransportUnavailable { .. } => "TRANSPORT_UNAVAILABLE",
            RuntimeError::TransportTimeout => "TRANSPORT_TIMEOUT",
            RuntimeError::ProviderError { .. } => "PROVIDER_ERROR",
            RuntimeError::EmptyResponse => "EMPTY_RESPONSE",
            RuntimeError::ConfigInvalid { .. } => "CONFIG_INVALID",
            RuntimeError::PathOutOfRoot { .. } => "PATH_OUT_OF_ROOT",
            RuntimeError::NotBound { .. } => "NOT_BOUND",
            RuntimeError::NotWhitelisted { .. } => "NOT_WHITELISTED",
            RuntimeError::Database(_) => "DATABASE_ERROR",
            RuntimeError::Serialization(_) => "SERIALIZATION_ERROR",
            RuntimeError::Io(_) => "IO_ERROR",
            RuntimeError::Internal(_) => "INTERNAL_ERROR",
            RuntimeError::Unknown { code, .. } => code.as_str(),
        }
    }

    /// Build the wire envelope `{ok: false, error: {code, message}}` payload.
    pub fn to_envelope(&self) -> serde_json::Value {
        serde_json::json!({
            "ok": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
