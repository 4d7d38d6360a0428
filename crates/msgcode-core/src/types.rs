use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, normalized chat identifier from the messaging transport.
///
/// Normalization (reducing a raw transport id to a stable suffix form) is
/// the Transport Adapter's job (`msgcode-transport`); this type is just the
/// shared currency every other component addresses a chat by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChatId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-turn request identifier. UUIDv7 — time-sortable, useful for log
/// correlation across the Ingress Loop, Tool Loop, and Thread Journal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which pipeline a workspace runs: the tool-loop agent, or a faithful
/// pass-through to an external interactive process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    Agent,
    Client,
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeKind::Agent => write!(f, "agent"),
            RuntimeKind::Client => write!(f, "client"),
        }
    }
}

impl std::str::FromStr for RuntimeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "agent" => Ok(RuntimeKind::Agent),
            "client" => Ok(RuntimeKind::Client),
            other => Err(format!("unknown runtime kind: {other}")),
        }
    }
}

/// Why a turn is entering the Orchestrator. Recorded on every journal and
/// telemetry line so schedule-sourced turns are distinguishable from
/// ordinary user turns without a separate code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSource {
    User,
    Schedule,
    Steer,
    FollowUp,
}

impl fmt::Display for TurnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnSource::User => write!(f, "user"),
            TurnSource::Schedule => write!(f, "schedule"),
            TurnSource::Steer => write!(f, "steer"),
            TurnSource::FollowUp => write!(f, "follow_up"),
        }
    }
}

/// Policy mode for a workspace: whether tools may reach outside the
/// local machine (network egress, external services).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyMode {
    LocalOnly,
    EgressAllowed,
}

impl Default for PolicyMode {
    fn default() -> Self {
        PolicyMode::LocalOnly
    }
}

/// Tooling invocation mode: whether the model must name a tool explicitly
/// per turn, or may chain tool calls autonomously within the loop ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolingMode {
    Explicit,
    Autonomous,
}

impl Default for ToolingMode {
    fn default() -> Self {
        ToolingMode::Explicit
    }
}
