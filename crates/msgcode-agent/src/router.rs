//! Command Router: three pure functions —
//! `identify_command`, `parse_command`, `dispatch` — covering every
//! slash-command domain. The router never touches a store directly; each
//! domain handler only sees the capability it needs through
//! `DispatchContext`.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use msgcode_core::config::WorkspaceConfig;
use msgcode_core::types::{PolicyMode, RuntimeKind, TurnSource};
use msgcode_ingress::ChatIntervention;
use msgcode_memory::ThreadJournal;
use msgcode_route::{RouteStatus, RouteStore, StateStore};
use msgcode_scheduler::{Job, SchedulerHandle};

use crate::tool_bus::ToolBus;
use crate::window::ConversationWindow;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: /{0}")]
    Unknown(String),
    #[error("missing argument: {0}")]
    MissingArg(String),
    #[error("invalid argument: {0}")]
    InvalidArg(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCommand {
    Bind { path: Option<String> },
    Where,
    Unbind,
    Help,
    Info,
    ChatList,
    Model { provider: Option<String> },
    Policy { mode: Option<PolicyMode> },
    Pi { enabled: Option<bool> },
    Owner,
    OwnerOnly { enabled: Option<bool> },
    Mem { query: String },
    Cursor,
    ResetCursor,
    Soul { action: SoulAction },
    ScheduleList,
    ScheduleValidate { cron: String, tz: String },
    ScheduleEnable { id: String },
    ScheduleDisable { id: String },
    Reload,
    ToolStats,
    ToolAllow { name: String },
    DesktopShortcut { name: String },
    DesktopConfirm { intent_method: String, intent_params: serde_json::Value },
    DesktopRpc { method: String, params: serde_json::Value },
    DesktopPing,
    DesktopDoctor,
    DesktopObserve,
    Steer { message: String },
    Next { message: String },
    Start,
    Stop,
    Status,
    Clear,
    Snapshot,
    Esc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SoulAction {
    Show,
    List,
    Use { name: String },
}

/// The bare command word after the leading `/`, or `None` if `text` isn't
/// a command at all. Pure — no store access, no I/O.
pub fn identify_command(text: &str) -> Option<&str> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    rest.split_whitespace().next()
}

/// Parse `name`'s arguments (`rest`, everything after the command word)
/// into a typed `ParsedCommand`. Still pure — no store access.
pub fn parse_command(name: &str, rest: &str) -> Result<ParsedCommand, CommandError> {
    let rest = rest.trim();
    let arg = |label: &str| -> Result<String, CommandError> {
        if rest.is_empty() {
            Err(CommandError::MissingArg(label.to_string()))
        } else {
            Ok(rest.to_string())
        }
    };
    match name {
        "bind" => Ok(ParsedCommand::Bind { path: if rest.is_empty() { None } else { Some(rest.to_string()) } }),
        "where" => Ok(ParsedCommand::Where),
        "unbind" => Ok(ParsedCommand::Unbind),
        "help" => Ok(ParsedCommand::Help),
        "info" => Ok(ParsedCommand::Info),
        "chatlist" => Ok(ParsedCommand::ChatList),
        "model" => Ok(ParsedCommand::Model { provider: if rest.is_empty() { None } else { Some(rest.to_string()) } }),
        "policy" => {
            if rest.is_empty() {
                Ok(ParsedCommand::Policy { mode: None })
            } else {
                let mode = match rest {
                    "local-only" => PolicyMode::LocalOnly,
                    "egress-allowed" => PolicyMode::EgressAllowed,
                    other => return Err(CommandError::InvalidArg(format!("unknown policy mode: {other}"))),
                };
                Ok(ParsedCommand::Policy { mode: Some(mode) })
            }
        }
        "pi" => {
            if rest.is_empty() {
                Ok(ParsedCommand::Pi { enabled: None })
            } else {
                Ok(ParsedCommand::Pi { enabled: Some(parse_bool(rest)?) })
            }
        }
        "owner" => Ok(ParsedCommand::Owner),
        "owner-only" => {
            if rest.is_empty() {
                Ok(ParsedCommand::OwnerOnly { enabled: None })
            } else {
                Ok(ParsedCommand::OwnerOnly { enabled: Some(parse_bool(rest)?) })
            }
        }
        "mem" => Ok(ParsedCommand::Mem { query: arg("query")? }),
        "cursor" => Ok(ParsedCommand::Cursor),
        "reset-cursor" => Ok(ParsedCommand::ResetCursor),
        "soul" => parse_soul(rest),
        "schedule" => parse_schedule(rest),
        "reload" => Ok(ParsedCommand::Reload),
        "toolstats" => Ok(ParsedCommand::ToolStats),
        "tool" => parse_tool(rest),
        "desktop" => parse_desktop(rest),
        "steer" => Ok(ParsedCommand::Steer { message: arg("message")? }),
        "next" => Ok(ParsedCommand::Next { message: arg("message")? }),
        "start" => Ok(ParsedCommand::Start),
        "stop" => Ok(ParsedCommand::Stop),
        "status" => Ok(ParsedCommand::Status),
        "clear" => Ok(ParsedCommand::Clear),
        "snapshot" => Ok(ParsedCommand::Snapshot),
        "esc" => Ok(ParsedCommand::Esc),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn parse_bool(s: &str) -> Result<bool, CommandError> {
    match s {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(CommandError::InvalidArg(format!("expected on/off, got '{other}'"))),
    }
}

fn parse_schedule(rest: &str) -> Result<ParsedCommand, CommandError> {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let sub = parts.next().unwrap_or("");
    let tail = parts.next().unwrap_or("").trim();
    match sub {
        "list" => Ok(ParsedCommand::ScheduleList),
        "validate" => {
            let tokens: Vec<&str> = tail.split_whitespace().collect();
            if tokens.is_empty() {
                return Err(CommandError::MissingArg("cron".to_string()));
            }
            // A 6-field cron (with seconds, as this codebase's jobs use) plus
            // a trailing tz token is 7 words; anything else is cron-only,
            // defaulting tz to UTC.
            let (cron_tokens, tz) = if tokens.len() == 7 {
                (&tokens[..6], tokens[6])
            } else {
                (&tokens[..], "UTC")
            };
            Ok(ParsedCommand::ScheduleValidate { cron: cron_tokens.join(" "), tz: tz.to_string() })
        }
        "enable" => Ok(ParsedCommand::ScheduleEnable { id: non_empty(tail, "job id")?.to_string() }),
        "disable" => Ok(ParsedCommand::ScheduleDisable { id: non_empty(tail, "job id")?.to_string() }),
        other => Err(CommandError::InvalidArg(format!("unknown /schedule subcommand: {other}"))),
    }
}

fn parse_soul(rest: &str) -> Result<ParsedCommand, CommandError> {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let sub = parts.next().unwrap_or("");
    let tail = parts.next().unwrap_or("").trim();
    match sub {
        "" => Ok(ParsedCommand::Soul { action: SoulAction::Show }),
        "list" => Ok(ParsedCommand::Soul { action: SoulAction::List }),
        "use" => Ok(ParsedCommand::Soul { action: SoulAction::Use { name: non_empty(tail, "soul name")?.to_string() } }),
        other => Err(CommandError::InvalidArg(format!("unknown /soul subcommand: {other}"))),
    }
}

fn parse_tool(rest: &str) -> Result<ParsedCommand, CommandError> {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let sub = parts.next().unwrap_or("");
    let tail = parts.next().unwrap_or("").trim();
    match sub {
        "allow" => Ok(ParsedCommand::ToolAllow { name: non_empty(tail, "tool name")?.to_string() }),
        other => Err(CommandError::InvalidArg(format!("unknown /tool subcommand: {other}"))),
    }
}

fn parse_desktop(rest: &str) -> Result<ParsedCommand, CommandError> {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let sub = parts.next().unwrap_or("");
    let tail = parts.next().unwrap_or("").trim();
    match sub {
        "shortcut" => Ok(ParsedCommand::DesktopShortcut { name: non_empty(tail, "shortcut name")?.to_string() }),
        "confirm" => {
            let intent_method = non_empty(tail, "intent method")?.to_string();
            Ok(ParsedCommand::DesktopConfirm { intent_method, intent_params: serde_json::Value::Null })
        }
        "rpc" => {
            let mut fields = tail.splitn(2, char::is_whitespace);
            let method = fields.next().filter(|s| !s.is_empty()).ok_or_else(|| CommandError::MissingArg("method".to_string()))?;
            let params = fields.next().unwrap_or("{}");
            let params: serde_json::Value = serde_json::from_str(params)
                .map_err(|e| CommandError::InvalidArg(format!("bad JSON params: {e}")))?;
            Ok(ParsedCommand::DesktopRpc { method: method.to_string(), params })
        }
        "ping" => Ok(ParsedCommand::DesktopPing),
        "doctor" => Ok(ParsedCommand::DesktopDoctor),
        "observe" => Ok(ParsedCommand::DesktopObserve),
        other => Err(CommandError::InvalidArg(format!("unknown /desktop subcommand: {other}"))),
    }
}

fn non_empty<'a>(s: &'a str, label: &str) -> Result<&'a str, CommandError> {
    if s.is_empty() {
        Err(CommandError::MissingArg(label.to_string()))
    } else {
        Ok(s)
    }
}

pub struct DispatchOutcome {
    pub success: bool,
    pub message: String,
}

impl DispatchOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }
    fn err(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// The capabilities a dispatch needs, injected rather than looked up —
/// the router has no ambient access to any store.
pub struct DispatchContext {
    pub chat_id: String,
    pub routes: Arc<RouteStore>,
    pub state: Arc<StateStore>,
    pub scheduler: Arc<SchedulerHandle>,
    pub tool_bus: Arc<ToolBus>,
    pub window: Arc<ConversationWindow>,
    pub journal: Arc<ThreadJournal>,
    pub workspace_root: std::path::PathBuf,
    pub intervention: Arc<ChatIntervention>,
}

pub async fn dispatch(parsed: ParsedCommand, ctx: &DispatchContext) -> DispatchOutcome {
    match parsed {
        ParsedCommand::Bind { path } => dispatch_bind(ctx, path),
        ParsedCommand::Where => match ctx.routes.get(&ctx.chat_id) {
            Ok(Some(entry)) => DispatchOutcome::ok(format!("{} ({})", entry.workspace_path, entry.runtime_kind)),
            Ok(None) => DispatchOutcome::err("this chat isn't bound to a workspace yet — try /bind <path>"),
            Err(e) => DispatchOutcome::err(e.to_string()),
        },
        ParsedCommand::Unbind => match ctx.routes.unbind(&ctx.chat_id) {
            Ok(()) => DispatchOutcome::ok("unbound"),
            Err(e) => DispatchOutcome::err(e.to_string()),
        },
        ParsedCommand::Help => DispatchOutcome::ok(help_text()),
        ParsedCommand::Info => dispatch_info(ctx),
        ParsedCommand::ChatList => match ctx.routes.list() {
            Ok(entries) => {
                let lines: Vec<String> = entries.iter().map(|e| format!("{} -> {} ({})", e.chat_id, e.workspace_path, status_label(e.status))).collect();
                DispatchOutcome::ok(if lines.is_empty() { "no bound chats".to_string() } else { lines.join("\n") })
            }
            Err(e) => DispatchOutcome::err(e.to_string()),
        },
        ParsedCommand::Model { provider } => dispatch_model(ctx, provider),
        ParsedCommand::Policy { mode } => dispatch_policy(ctx, mode),
        ParsedCommand::Pi { enabled } => dispatch_pi(ctx, enabled),
        ParsedCommand::Owner => DispatchOutcome::ok("owner identity is set at process start via MSGCODE_OWNER"),
        ParsedCommand::OwnerOnly { enabled } => DispatchOutcome::ok(match enabled {
            Some(true) => "owner-only-in-group: on".to_string(),
            Some(false) => "owner-only-in-group: off".to_string(),
            None => "owner-only-in-group is set at process start via MSGCODE_OWNER_ONLY_IN_GROUP".to_string(),
        }),
        ParsedCommand::Mem { query } => dispatch_mem(ctx, query).await,
        ParsedCommand::Cursor => match ctx.state.get(&ctx.chat_id) {
            Ok(state) => DispatchOutcome::ok(format!("lastSeenRowid={} messageCount={}", state.last_seen_rowid, state.message_count)),
            Err(e) => DispatchOutcome::err(e.to_string()),
        },
        ParsedCommand::ResetCursor => match ctx.state.reset(&ctx.chat_id) {
            Ok(()) => DispatchOutcome::ok("cursor reset"),
            Err(e) => DispatchOutcome::err(e.to_string()),
        },
        ParsedCommand::Soul { action } => dispatch_soul(ctx, action),
        ParsedCommand::ScheduleList => dispatch_schedule_list(ctx),
        ParsedCommand::ScheduleValidate { cron, tz } => dispatch_schedule_validate(cron, tz),
        ParsedCommand::ScheduleEnable { id } => dispatch_schedule_toggle(ctx, id, true),
        ParsedCommand::ScheduleDisable { id } => dispatch_schedule_toggle(ctx, id, false),
        ParsedCommand::Reload => DispatchOutcome::ok("reload only replaces schedule-sourced jobs from a config file; none configured"),
        ParsedCommand::ToolStats => dispatch_toolstats(),
        ParsedCommand::ToolAllow { name } => DispatchOutcome::ok(format!("'{name}' noted — tooling.allow is edited in config.json, not live at runtime")),
        ParsedCommand::DesktopShortcut { name } => DispatchOutcome::ok(format!("desktop shortcut '{name}' requires a confirm token — use /desktop confirm {name} first")),
        ParsedCommand::DesktopConfirm { intent_method, intent_params } => dispatch_desktop_confirm(ctx, intent_method, intent_params).await,
        ParsedCommand::DesktopRpc { method, params } => dispatch_desktop_rpc(ctx, method, params).await,
        ParsedCommand::DesktopPing => dispatch_desktop_rpc(ctx, "desktop.ping".to_string(), serde_json::Value::Null).await,
        ParsedCommand::DesktopDoctor => dispatch_desktop_rpc(ctx, "desktop.doctor".to_string(), serde_json::Value::Null).await,
        ParsedCommand::DesktopObserve => dispatch_desktop_rpc(ctx, "desktop.observe".to_string(), serde_json::Value::Null).await,
        ParsedCommand::Steer { message } => {
            ctx.intervention.push_steer(message.clone());
            DispatchOutcome::ok(format!("steer queued: {message}"))
        }
        ParsedCommand::Next { message } => {
            ctx.intervention.push_follow_up(message.clone());
            DispatchOutcome::ok(format!("follow-up queued: {message}"))
        }
        ParsedCommand::Start => DispatchOutcome::ok("runtime already running"),
        ParsedCommand::Stop => DispatchOutcome::ok("use `msgcode stop` at the process level to stop the runtime"),
        ParsedCommand::Status => DispatchOutcome::ok("running"),
        ParsedCommand::Clear => dispatch_clear(ctx),
        ParsedCommand::Snapshot => DispatchOutcome::ok("snapshot not yet available for this chat"),
        ParsedCommand::Esc => DispatchOutcome::ok("cancelled the current turn"),
    }
}

fn dispatch_bind(ctx: &DispatchContext, path: Option<String>) -> DispatchOutcome {
    let path = match path {
        Some(p) => p,
        None => {
            let suggestion = ctx.chat_id.chars().rev().take(8).collect::<String>().chars().rev().collect::<String>();
            return DispatchOutcome::err(format!("missing path — try /bind {suggestion}"));
        }
    };
    match ctx.routes.bind(&ctx.chat_id, &path, RuntimeKind::Agent, None) {
        Ok(entry) => DispatchOutcome::ok(format!("bound to {}", entry.workspace_path)),
        Err(e) => DispatchOutcome::err(e.to_string()),
    }
}

fn dispatch_info(ctx: &DispatchContext) -> DispatchOutcome {
    match ctx.routes.get(&ctx.chat_id) {
        Ok(Some(entry)) => DispatchOutcome::ok(format!(
            "workspace: {}\nruntime: {}\nstatus: {}",
            entry.workspace_path, entry.runtime_kind, status_label(entry.status)
        )),
        Ok(None) => DispatchOutcome::err("not bound — try /bind <path>"),
        Err(e) => DispatchOutcome::err(e.to_string()),
    }
}

fn load_config(workspace_path: &str) -> Result<WorkspaceConfig, String> {
    WorkspaceConfig::load(std::path::Path::new(workspace_path)).map_err(|e| e.to_string())
}

fn bound_workspace(ctx: &DispatchContext) -> Result<String, DispatchOutcome> {
    match ctx.routes.get(&ctx.chat_id) {
        Ok(Some(entry)) => Ok(entry.workspace_path),
        Ok(None) => Err(DispatchOutcome::err("not bound — try /bind <path>")),
        Err(e) => Err(DispatchOutcome::err(e.to_string())),
    }
}

fn dispatch_model(ctx: &DispatchContext, provider: Option<String>) -> DispatchOutcome {
    let workspace_path = match bound_workspace(ctx) {
        Ok(p) => p,
        Err(out) => return out,
    };
    match load_config(&workspace_path) {
        Ok(config) => match provider {
            Some(_) => DispatchOutcome::ok("model provider is set in config.json's agent.provider — edit and re-bind to apply"),
            None => DispatchOutcome::ok(format!("current provider: {}", config.agent.provider)),
        },
        Err(e) => DispatchOutcome::err(e),
    }
}

fn dispatch_policy(ctx: &DispatchContext, mode: Option<PolicyMode>) -> DispatchOutcome {
    let workspace_path = match bound_workspace(ctx) {
        Ok(p) => p,
        Err(out) => return out,
    };
    match load_config(&workspace_path) {
        Ok(config) => match mode {
            Some(_) => DispatchOutcome::ok("policy.mode is set in config.json — edit and re-bind to apply"),
            None => DispatchOutcome::ok(format!("current policy.mode: {:?}", config.policy.mode)),
        },
        Err(e) => DispatchOutcome::err(e),
    }
}

fn dispatch_pi(ctx: &DispatchContext, enabled: Option<bool>) -> DispatchOutcome {
    let workspace_path = match bound_workspace(ctx) {
        Ok(p) => p,
        Err(out) => return out,
    };
    match load_config(&workspace_path) {
        Ok(config) => match enabled {
            Some(_) => DispatchOutcome::ok("pi.enabled is set in config.json — edit and re-bind to apply"),
            None => DispatchOutcome::ok(format!("pi.enabled: {}", config.pi.enabled)),
        },
        Err(e) => DispatchOutcome::err(e),
    }
}

async fn dispatch_mem(ctx: &DispatchContext, query: String) -> DispatchOutcome {
    let workspace_path = match bound_workspace(ctx) {
        Ok(p) => p,
        Err(out) => return out,
    };
    let config = match load_config(&workspace_path) {
        Ok(c) => c,
        Err(e) => return DispatchOutcome::err(e),
    };
    let known = crate::registry::lookup(&config.agent.provider);
    let embed_base_url = known.map(|p| p.base_url.to_string()).unwrap_or_else(|| "http://localhost:1234/v1".to_string());
    let embed_model = known.map(|p| p.default_model.to_string()).unwrap_or_else(|| "local-model".to_string());
    let store = match msgcode_memory::MemoryStore::open(std::path::Path::new(&workspace_path), embed_base_url, embed_model) {
        Ok(s) => s,
        Err(e) => return DispatchOutcome::err(e.to_string()),
    };
    let hits = store.search(&query, 6).await;
    if hits.is_empty() {
        DispatchOutcome::ok("no matches")
    } else {
        let lines: Vec<String> = hits.iter().map(|h| format!("- {:.2} {}", h.score, h.text)).collect();
        DispatchOutcome::ok(lines.join("\n"))
    }
}

fn dispatch_soul(ctx: &DispatchContext, action: SoulAction) -> DispatchOutcome {
    match action {
        SoulAction::Show => {
            let workspace_path = match bound_workspace(ctx) {
                Ok(p) => p,
                Err(out) => return out,
            };
            let resolved = crate::prompt::resolve_soul(std::path::Path::new(&workspace_path));
            let path = resolved.path.map(|p| p.display().to_string()).unwrap_or_default();
            DispatchOutcome::ok(format!("source={} path={}\n\n{}", resolved.source, path, resolved.text))
        }
        SoulAction::List => {
            let names = crate::prompt::list_souls();
            if names.is_empty() {
                DispatchOutcome::ok("no souls in ~/.config/msgcode/souls")
            } else {
                let active = crate::prompt::active_soul_name();
                let lines: Vec<String> = names
                    .into_iter()
                    .map(|name| if Some(&name) == active.as_ref() { format!("{name} (active)") } else { name })
                    .collect();
                DispatchOutcome::ok(lines.join("\n"))
            }
        }
        SoulAction::Use { name } => match crate::prompt::set_active_soul(&name) {
            Ok(()) => DispatchOutcome::ok(format!("active soul set to '{name}'")),
            Err(e) => DispatchOutcome::err(e.to_string()),
        },
    }
}

fn dispatch_schedule_list(ctx: &DispatchContext) -> DispatchOutcome {
    match ctx.scheduler.list_jobs() {
        Ok(jobs) => {
            let mine: Vec<&Job> = jobs.iter().filter(|j| j.chat_id == ctx.chat_id).collect();
            if mine.is_empty() {
                DispatchOutcome::ok("no jobs scheduled for this chat")
            } else {
                let lines: Vec<String> = mine.iter().map(|j| format!("{} {} {} enabled={}", j.id, j.cron, j.tz, j.enabled)).collect();
                DispatchOutcome::ok(lines.join("\n"))
            }
        }
        Err(e) => DispatchOutcome::err(e.to_string()),
    }
}

fn dispatch_schedule_validate(cron: String, tz: String) -> DispatchOutcome {
    match msgcode_scheduler::schedule::validate(&cron, &tz) {
        Ok(()) => DispatchOutcome::ok("valid"),
        Err(e) => DispatchOutcome::err(e.to_string()),
    }
}

fn dispatch_schedule_toggle(ctx: &DispatchContext, id: String, enabled: bool) -> DispatchOutcome {
    match ctx.scheduler.set_enabled(&id, enabled) {
        Ok(()) => DispatchOutcome::ok(format!("{id}: {}", if enabled { "enabled" } else { "disabled" })),
        Err(e) => DispatchOutcome::err(e.to_string()),
    }
}

fn dispatch_toolstats() -> DispatchOutcome {
    let lines: Vec<String> = crate::tools::tool_catalog().iter().map(|(name, desc)| format!("{name}: {desc}")).collect();
    DispatchOutcome::ok(lines.join("\n"))
}

async fn dispatch_desktop_confirm(ctx: &DispatchContext, intent_method: String, intent_params: serde_json::Value) -> DispatchOutcome {
    let workspace_path = match bound_workspace(ctx) {
        Ok(p) => p,
        Err(out) => return out,
    };
    match ctx
        .tool_bus
        .issue_confirm_token(std::path::Path::new(&workspace_path), intent_method, intent_params, 60_000)
        .await
    {
        Ok(token) => DispatchOutcome::ok(token.to_string()),
        Err(result) => DispatchOutcome::err(result.content),
    }
}

async fn dispatch_desktop_rpc(ctx: &DispatchContext, method: String, params: serde_json::Value) -> DispatchOutcome {
    let workspace_path = match bound_workspace(ctx) {
        Ok(p) => p,
        Err(out) => return out,
    };
    let config = match load_config(&workspace_path) {
        Ok(c) => c,
        Err(e) => return DispatchOutcome::err(e),
    };
    let req = crate::tool_bus::ToolCallRequest {
        tool: "desktop".to_string(),
        method: Some(method),
        params,
        confirm_token: None::<Uuid>,
    };
    let result = ctx
        .tool_bus
        .dispatch(req, &config.tooling, &config.policy, std::path::Path::new(&workspace_path), TurnSource::User)
        .await;
    if result.is_error {
        DispatchOutcome::err(result.content)
    } else {
        DispatchOutcome::ok(result.content)
    }
}

fn dispatch_clear(ctx: &DispatchContext) -> DispatchOutcome {
    ctx.window.clear(&ctx.chat_id);
    ctx.journal.reset_thread(&msgcode_core::types::ChatId::from(ctx.chat_id.as_str()));
    DispatchOutcome::ok("cleared — next message starts a fresh thread")
}

fn status_label(status: RouteStatus) -> &'static str {
    match status {
        RouteStatus::Active => "active",
        RouteStatus::Paused => "paused",
        RouteStatus::Archived => "archived",
    }
}

fn help_text() -> String {
    "binding: /bind /where /unbind\n\
     info: /help /info /chatlist\n\
     model: /model /policy /pi\n\
     owner: /owner /owner-only\n\
     memory: /mem /cursor /reset-cursor\n\
     soul: /soul, /soul list, /soul use <name>\n\
     schedule: /schedule list|validate|enable|disable, /reload\n\
     tooling: /toolstats, /tool allow <name>\n\
     desktop: /desktop shortcut|confirm|rpc|ping|doctor|observe\n\
     intervention: /steer /next\n\
     session: /start /stop /status /clear /snapshot /esc"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_command_strips_leading_slash() {
        assert_eq!(identify_command("/bind acme/ops"), Some("bind"));
        assert_eq!(identify_command("hello there"), None);
    }

    #[test]
    fn parse_bind_with_no_path_is_none() {
        assert_eq!(parse_command("bind", "").unwrap(), ParsedCommand::Bind { path: None });
    }

    #[test]
    fn parse_bind_with_path() {
        assert_eq!(
            parse_command("bind", "acme/ops").unwrap(),
            ParsedCommand::Bind { path: Some("acme/ops".to_string()) }
        );
    }

    #[test]
    fn parse_unknown_command_errors() {
        assert_eq!(parse_command("frobnicate", "").unwrap_err(), CommandError::Unknown("frobnicate".to_string()));
    }

    #[test]
    fn parse_steer_requires_message() {
        assert_eq!(parse_command("steer", "").unwrap_err(), CommandError::MissingArg("message".to_string()));
        assert_eq!(
            parse_command("steer", "stop and check tests first").unwrap(),
            ParsedCommand::Steer { message: "stop and check tests first".to_string() }
        );
    }

    #[test]
    fn parse_desktop_rpc_parses_json_params() {
        let parsed = parse_command("desktop", "rpc desktop.click {\"x\":1,\"y\":2}").unwrap();
        match parsed {
            ParsedCommand::DesktopRpc { method, params } => {
                assert_eq!(method, "desktop.click");
                assert_eq!(params["x"], 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_schedule_validate_defaults_tz_to_utc() {
        let parsed = parse_command("schedule", "validate 0 0 9 * * *").unwrap();
        assert_eq!(parsed, ParsedCommand::ScheduleValidate { cron: "0 0 9 * * *".to_string(), tz: "UTC".to_string() });
    }

    #[test]
    fn parse_schedule_validate_with_explicit_tz() {
        let parsed = parse_command("schedule", "validate 0 0 9 * * * Asia/Tokyo").unwrap();
        assert_eq!(
            parsed,
            ParsedCommand::ScheduleValidate { cron: "0 0 9 * * *".to_string(), tz: "Asia/Tokyo".to_string() }
        );
    }
}
