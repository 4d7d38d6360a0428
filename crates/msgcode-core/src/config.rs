use std::path::PathBuf;

use figment::providers::{Env, Format, Json};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, RuntimeError};
use crate::types::{PolicyMode, RuntimeKind, ToolingMode};

/// Process-wide configuration, sourced entirely from the environment (the
/// runtime has no process-level config file — only the per-workspace one
/// described by [`WorkspaceConfig`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Required owner identity (`MSGCODE_OWNER`); messages from any other
    /// sender are rejected unless an allow-listed identity maps to the same
    /// user.
    pub owner: String,

    /// When true, the owner-only gate applies in group chats too, not just
    /// DMs (`MSGCODE_OWNER_ONLY_IN_GROUP`).
    #[serde(default)]
    pub owner_only_in_group: bool,

    /// Overrides the workspace root directory resolved from routing
    /// (`WORKSPACE_ROOT`).
    pub workspace_root: Option<PathBuf>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Also emit logs to stderr in addition to the rotating file sink
    /// (`LOG_CONSOLE`).
    #[serde(default)]
    pub log_console: bool,

    /// Path to the desktop control binary (`MSGCODE_DESKTOPCTL_PATH`).
    pub desktopctl_path: Option<PathBuf>,

    /// Path to the transport binary (`IMSG_PATH`), also read as a fallback
    /// by the Transport Adapter when `MSGCODE_TRANSPORT_PATH` is unset.
    pub imsg_path: Option<PathBuf>,

    /// Gated test-only desktop hooks (`OPENCLAW_DESKTOP_TEST_HOOKS`). Never
    /// enabled outside test runs.
    #[serde(default)]
    pub desktop_test_hooks: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RuntimeConfig {
    /// Load from the process environment. `MSGCODE_OWNER` is the only
    /// required value; everything else has a documented default or is
    /// treated as absent.
    pub fn load() -> Result<Self> {
        let config: Self = Figment::new()
            .merge(
                Env::raw().only(&[
                    "MSGCODE_OWNER",
                    "MSGCODE_OWNER_ONLY_IN_GROUP",
                    "WORKSPACE_ROOT",
                    "LOG_LEVEL",
                    "LOG_CONSOLE",
                    "MSGCODE_DESKTOPCTL_PATH",
                    "IMSG_PATH",
                    "OPENCLAW_DESKTOP_TEST_HOOKS",
                ]),
            )
            .merge(Env::raw().map(|key| match key.as_str() {
                "MSGCODE_OWNER" => "owner".into(),
                "MSGCODE_OWNER_ONLY_IN_GROUP" => "owner_only_in_group".into(),
                "WORKSPACE_ROOT" => "workspace_root".into(),
                "LOG_LEVEL" => "log_level".into(),
                "LOG_CONSOLE" => "log_console".into(),
                "MSGCODE_DESKTOPCTL_PATH" => "desktopctl_path".into(),
                "IMSG_PATH" => "imsg_path".into(),
                "OPENCLAW_DESKTOP_TEST_HOOKS" => "desktop_test_hooks".into(),
                other => other.into(),
            }))
            .extract()
            .map_err(|e| RuntimeError::ConfigInvalid {
                message: e.to_string(),
            })?;
        Ok(config)
    }
}

/// Per-workspace configuration, `<ws>/.msgcode/config.json`. All keys are
/// optional; a missing file yields the defaults on every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub runtime: RuntimeSection,
    pub agent: AgentSection,
    pub tmux: TmuxSection,
    pub policy: PolicySection,
    pub pi: PiSection,
    pub tooling: ToolingSection,
    pub memory: MemorySection,
    pub context: ContextSection,
    pub tool_loop: ToolLoopSection,

    /// Legacy `runner.default = "llama" | "claude"`. Read-only: never
    /// written back out. `serde(alias)` lets a pre-migration config.json
    /// still parse without the workspace owner editing anything.
    #[serde(alias = "runner")]
    pub legacy_runner: Option<LegacyRunnerSection>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeSection::default(),
            agent: AgentSection::default(),
            tmux: TmuxSection::default(),
            policy: PolicySection::default(),
            pi: PiSection::default(),
            tooling: ToolingSection::default(),
            memory: MemorySection::default(),
            context: ContextSection::default(),
            tool_loop: ToolLoopSection::default(),
            legacy_runner: None,
        }
    }
}

/// `MAX_ITERATIONS`, the configured ceiling on Tool Loop round-trips
/// (default: 8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolLoopSection {
    pub max_iterations: u32,
}

impl Default for ToolLoopSection {
    fn default() -> Self {
        Self { max_iterations: 8 }
    }
}

/// Per-section character budgets for the Context Assembler. Each section
/// caps out at `fraction * total_chars`; truncation drops whole sections
/// from the lowest-priority end (tools, then window, then memory, then
/// summary) before soul is ever touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextSection {
    pub budget: BudgetSection,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            budget: BudgetSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BudgetSection {
    pub total_chars: u32,
    /// Fractions of `total_chars`. Not required to sum to 1.0 — each
    /// section is capped independently.
    pub soul: f32,
    pub summary: f32,
    pub memory: f32,
    pub window: f32,
    pub tools: f32,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            total_chars: 24_000,
            soul: 0.35,
            summary: 0.10,
            memory: 0.20,
            window: 0.25,
            tools: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub kind: RuntimeKind,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            kind: RuntimeKind::Agent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub provider: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            provider: "lmstudio".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TmuxSection {
    pub client: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub mode: PolicyMode,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            mode: PolicyMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PiSection {
    pub enabled: bool,
}

impl Default for PiSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolingSection {
    pub mode: ToolingMode,
    pub allow: Vec<String>,
}

impl Default for ToolingSection {
    fn default() -> Self {
        Self {
            mode: ToolingMode::default(),
            allow: vec![
                "read_file".to_string(),
                "write_file".to_string(),
                "edit_file".to_string(),
                "bash".to_string(),
                "desktop".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemorySection {
    pub inject: MemoryInjectSection,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            inject: MemoryInjectSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryInjectSection {
    pub enabled: bool,
    pub top_k: u32,
    pub max_chars: u32,
}

impl Default for MemoryInjectSection {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 6,
            max_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyRunnerSection {
    pub default: String,
}

impl WorkspaceConfig {
    /// Load `<ws>/.msgcode/config.json`, layered under
    /// `MSGCODE_WORKSPACE_`-prefixed env overrides. A missing file is not an
    /// error — the workspace just runs on defaults.
    pub fn load(workspace_path: &std::path::Path) -> Result<Self> {
        let config_path = workspace_path.join(".msgcode").join("config.json");
        let env_layer = Env::prefixed("MSGCODE_WORKSPACE_").split("_");
        let mut figment = Figment::new().merge(env_layer.clone());
        if config_path.exists() {
            figment = Figment::from(Json::file(&config_path)).merge(env_layer);
        }
        let mut config: Self = figment.extract().map_err(|e| RuntimeError::ConfigInvalid {
            message: e.to_string(),
        })?;
        config.apply_legacy_runner();
        Ok(config)
    }

    /// Auto-map a legacy `runner.default` onto `{runtime.kind: agent,
    /// agent.provider: lmstudio}`. The original value is degraded silently;
    /// only a log line records the mapping (see Open Questions in
    /// `DESIGN.md` for why this isn't surfaced to the chat).
    fn apply_legacy_runner(&mut self) {
        if let Some(legacy) = &self.legacy_runner {
            warn!(
                legacy_runner = legacy.default.as_str(),
                "legacy runner.default is deprecated, mapping to runtime.kind=agent, agent.provider=lmstudio"
            );
            self.runtime.kind = RuntimeKind::Agent;
            self.agent.provider = "lmstudio".to_string();
        }
    }
}
