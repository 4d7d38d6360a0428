//! Runtime Orchestrator: the `TurnHandler` the Ingress Loop's chat actors
//! call into for every turn. Resolves the chat's binding, branches into the
//! Tool Loop for `runtime.kind = agent` workspaces or the Client Pipeline for
//! `runtime.kind = client` ones, and is also where slash commands are routed
//! to the Command Router before either pipeline ever sees the text.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};

use msgcode_core::config::WorkspaceConfig;
use msgcode_core::error::Result;
use msgcode_core::types::{ChatId, RequestId, RuntimeKind, TurnSource};
use msgcode_hooks::{HookContext, HookEngine, HookEvent};
use msgcode_ingress::{ChatIntervention, TurnContext, TurnHandler};
use msgcode_memory::{MemoryStore, RuntimeMeta, ThreadJournal};
use msgcode_route::{RouteStore, StateStore};
use msgcode_scheduler::SchedulerHandle;
use msgcode_terminal::ClientPipeline;
use msgcode_transport::{OutboundPayload, TransportAdapter};

use crate::context::ContextAssembler;
use crate::openai::OpenAiProvider;
use crate::provider::{ChatRequest, ToolDefinition, Turn};
use crate::registry::{self, KnownProvider};
use crate::router::{dispatch, identify_command, parse_command, DispatchContext};
use crate::tool_bus::ToolBus;
use crate::tool_loop::run_tool_loop;
use crate::window::ConversationWindow;

const CLIENT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);
const FALLBACK_BASE_URL: &str = "http://localhost:1234/v1";
const FALLBACK_MODEL: &str = "local-model";

pub struct RuntimeOrchestrator {
    routes: Arc<RouteStore>,
    state: Arc<StateStore>,
    window: Arc<ConversationWindow>,
    tool_bus: Arc<ToolBus>,
    hooks: Arc<HookEngine>,
    scheduler: Arc<SchedulerHandle>,
    transport: Arc<TransportAdapter>,
    client_pipeline: Arc<ClientPipeline>,
    workspace_root: PathBuf,
    journals: DashMap<String, Arc<ThreadJournal>>,
    providers: DashMap<String, Arc<OpenAiProvider>>,
}

impl RuntimeOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        routes: Arc<RouteStore>,
        state: Arc<StateStore>,
        window: Arc<ConversationWindow>,
        tool_bus: Arc<ToolBus>,
        hooks: Arc<HookEngine>,
        scheduler: Arc<SchedulerHandle>,
        transport: Arc<TransportAdapter>,
        client_pipeline: Arc<ClientPipeline>,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            routes,
            state,
            window,
            tool_bus,
            hooks,
            scheduler,
            transport,
            client_pipeline,
            workspace_root,
            journals: DashMap::new(),
            providers: DashMap::new(),
        }
    }

    fn journal_for(&self, workspace_path: &Path) -> Result<Arc<ThreadJournal>> {
        let key = workspace_path.display().to_string();
        if let Some(existing) = self.journals.get(&key) {
            return Ok(existing.clone());
        }
        let journal = Arc::new(ThreadJournal::open(workspace_path)?);
        self.journals.insert(key, journal.clone());
        Ok(journal)
    }

    fn provider_for(&self, provider_id: &str, known: Option<&'static KnownProvider>) -> Arc<OpenAiProvider> {
        if let Some(existing) = self.providers.get(provider_id) {
            return existing.clone();
        }
        let api_key = api_key_for(provider_id);
        let provider = match known {
            Some(k) => Arc::new(OpenAiProvider::with_path(provider_id, api_key, k.base_url, k.chat_path)),
            None => Arc::new(OpenAiProvider::new(provider_id, api_key, FALLBACK_BASE_URL)),
        };
        self.providers.insert(provider_id.to_string(), provider.clone());
        provider
    }

    async fn reply(&self, chat_id: &str, text: &str) {
        if let Err(e) = self.transport.send(chat_id, OutboundPayload::Text(text.to_string())).await {
            warn!(chat = chat_id, error = %e, "failed to deliver reply");
            return;
        }
        self.hooks.emit_after(HookContext::new(
            HookEvent::MessageSent,
            serde_json::json!({"chatId": chat_id, "chars": text.len()}),
        ));
    }

    async fn handle_command(
        &self,
        chat_id: &str,
        name: &str,
        rest: &str,
        intervention: &Arc<ChatIntervention>,
    ) -> Result<()> {
        let outcome_message = match parse_command(name, rest) {
            Ok(parsed) => {
                let journal = match self.routes.get(chat_id)? {
                    Some(entry) if entry.is_active() => self.journal_for(Path::new(&entry.workspace_path))?,
                    _ => self.journal_for(&self.workspace_root)?,
                };
                let dctx = DispatchContext {
                    chat_id: chat_id.to_string(),
                    routes: self.routes.clone(),
                    state: self.state.clone(),
                    scheduler: self.scheduler.clone(),
                    tool_bus: self.tool_bus.clone(),
                    window: self.window.clone(),
                    journal,
                    workspace_root: self.workspace_root.clone(),
                    intervention: intervention.clone(),
                };
                dispatch(parsed, &dctx).await.message
            }
            Err(e) => e.to_string(),
        };
        self.reply(chat_id, &outcome_message).await;
        Ok(())
    }

    async fn handle_agent_turn(
        &self,
        chat_id: &str,
        chat_id_typed: &ChatId,
        request_id: &RequestId,
        text: &str,
        intervention: &Arc<ChatIntervention>,
        source: TurnSource,
        workspace_path: &Path,
        workspace_name: &str,
        config: &WorkspaceConfig,
    ) -> Result<String> {
        let journal = self.journal_for(workspace_path)?;
        journal.ensure_thread(
            chat_id_typed,
            workspace_name,
            &workspace_path.display().to_string(),
            text,
            RuntimeKind::Agent,
            RuntimeMeta::Agent { provider: &config.agent.provider },
            Utc::now(),
        )?;

        let known = registry::lookup(&config.agent.provider);
        let provider = self.provider_for(&config.agent.provider, known);

        let memory = if config.memory.inject.enabled {
            let embed_base_url = known.map(|k| k.base_url.to_string()).unwrap_or_else(|| FALLBACK_BASE_URL.to_string());
            let embed_model = known.map(|k| k.default_model.to_string()).unwrap_or_else(|| FALLBACK_MODEL.to_string());
            MemoryStore::open(workspace_path, embed_base_url, embed_model).ok()
        } else {
            None
        };

        let tools: Vec<ToolDefinition> = self
            .tool_bus
            .tool_definitions()
            .into_iter()
            .filter(|t| config.tooling.allow.iter().any(|allowed| allowed == t.name()))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();

        let assembler = ContextAssembler { memory: memory.as_ref(), window: self.window.as_ref(), tools };
        let assembled = assembler
            .assemble(workspace_path, chat_id, text, &config.context.budget, &config.memory.inject)
            .await;

        self.hooks.emit_after(
            HookContext::new(HookEvent::AgentStart, serde_json::json!({"provider": config.agent.provider}))
                .with_chat(chat_id_typed.clone(), request_id.clone()),
        );

        let model = known.map(|k| k.default_model.to_string()).unwrap_or_else(|| FALLBACK_MODEL.to_string());
        let system = assembled.messages.first().map(|m| m.content.clone()).unwrap_or_default();
        let turns: Vec<Turn> = assembled.messages.into_iter().skip(1).map(Turn::Message).collect();
        let request = ChatRequest { model, system, turns, max_tokens: 4096, tools: assembled.tools };

        let outcome = run_tool_loop(
            provider.as_ref(),
            request,
            &self.tool_bus,
            &config.tooling,
            &config.policy,
            workspace_path,
            intervention,
            source,
            config.tool_loop.max_iterations,
            None,
        )
        .await?;

        self.hooks.emit_after(
            HookContext::new(
                HookEvent::AgentComplete,
                serde_json::json!({"calledTools": outcome.called_tools}),
            )
            .with_chat(chat_id_typed.clone(), request_id.clone()),
        );

        self.window.push_turn(chat_id, text.to_string(), outcome.response.content.clone());
        if let Err(e) = journal.append_turn(chat_id_typed, text, &outcome.response.content, Utc::now()) {
            warn!(chat = chat_id, error = %e, "failed to append turn to thread journal");
        }

        Ok(outcome.response.content)
    }

    /// `runtime.kind = client`: faithful forwarding only — no soul, no
    /// memory, no tool section injected into what the external CLI sees.
    async fn handle_client_turn(
        &self,
        chat_id: &str,
        chat_id_typed: &ChatId,
        text: &str,
        workspace_path: &Path,
        workspace_name: &str,
        config: &WorkspaceConfig,
    ) -> Result<String> {
        let journal = self.journal_for(workspace_path)?;
        journal.ensure_thread(
            chat_id_typed,
            workspace_name,
            &workspace_path.display().to_string(),
            text,
            RuntimeKind::Client,
            RuntimeMeta::Client { tmux_client: config.tmux.client.as_deref() },
            Utc::now(),
        )?;

        let workspace_path_str = workspace_path.display().to_string();
        let session = self.client_pipeline.ensure_session(&workspace_path_str).await?;
        self.client_pipeline.send_text(&session, text).await?;
        let framing = self.client_pipeline.collect_reply(&session, None, CLIENT_REPLY_TIMEOUT).await?;

        self.window.push_turn(chat_id, text.to_string(), framing.text.clone());
        if let Err(e) = journal.append_turn(chat_id_typed, text, &framing.text, Utc::now()) {
            warn!(chat = chat_id, error = %e, "failed to append turn to thread journal");
        }

        Ok(framing.text)
    }
}

#[async_trait]
impl TurnHandler for RuntimeOrchestrator {
    async fn handle_turn(&self, ctx: TurnContext, intervention: Arc<ChatIntervention>) -> Result<()> {
        let chat_id = ctx.chat_id.as_str().to_string();

        self.hooks.emit_after(HookContext::new(
            HookEvent::MessageReceived,
            serde_json::json!({"source": ctx.source.to_string()}),
        ));

        if let Some(name) = identify_command(&ctx.text) {
            let rest = ctx
                .text
                .trim()
                .strip_prefix('/')
                .unwrap_or("")
                .splitn(2, char::is_whitespace)
                .nth(1)
                .unwrap_or("");
            return self.handle_command(&chat_id, name, rest, &intervention).await;
        }

        let entry = match self.routes.get(&chat_id)? {
            Some(entry) if entry.is_active() => entry,
            _ => {
                self.reply(&chat_id, "this chat isn't bound to a workspace yet — try /bind <path>").await;
                return Ok(());
            }
        };

        let workspace_path = PathBuf::from(&entry.workspace_path);
        let config = WorkspaceConfig::load(&workspace_path)?;
        let workspace_name = entry.label.clone().unwrap_or_else(|| {
            workspace_path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| entry.workspace_path.clone())
        });

        let result = match entry.runtime_kind {
            RuntimeKind::Agent => {
                self.handle_agent_turn(
                    &chat_id,
                    &ctx.chat_id,
                    &ctx.request_id,
                    &ctx.text,
                    &intervention,
                    ctx.source,
                    &workspace_path,
                    &workspace_name,
                    &config,
                )
                .await
            }
            RuntimeKind::Client => {
                self.handle_client_turn(&chat_id, &ctx.chat_id, &ctx.text, &workspace_path, &workspace_name, &config)
                    .await
            }
        };

        match result {
            Ok(text) => self.reply(&chat_id, &text).await,
            Err(e) => {
                info!(chat = %chat_id, error = %e, "turn failed, replying with error envelope");
                self.reply(&chat_id, &format!("error ({}): {e}", e.code())).await;
            }
        }

        // Drain any follow-ups `/next` queued while this turn was running
        // and re-enter with each as a new turn, oldest first, until empty.
        while let Some(follow_up_text) = intervention.drain_follow_up() {
            let follow_up_result = match entry.runtime_kind {
                RuntimeKind::Agent => {
                    self.handle_agent_turn(
                        &chat_id,
                        &ctx.chat_id,
                        &RequestId::new(),
                        &follow_up_text,
                        &intervention,
                        TurnSource::FollowUp,
                        &workspace_path,
                        &workspace_name,
                        &config,
                    )
                    .await
                }
                RuntimeKind::Client => {
                    self.handle_client_turn(&chat_id, &ctx.chat_id, &follow_up_text, &workspace_path, &workspace_name, &config)
                        .await
                }
            };
            match follow_up_result {
                Ok(text) => self.reply(&chat_id, &text).await,
                Err(e) => {
                    info!(chat = %chat_id, error = %e, "follow-up turn failed, replying with error envelope");
                    self.reply(&chat_id, &format!("error ({}): {e}", e.code())).await;
                }
            }
        }

        Ok(())
    }
}

/// `{PROVIDER_ID_UPPERCASE}_API_KEY`, e.g. `GROQ_API_KEY` for `groq`.
/// `lmstudio`/`llamacpp`/`localai` never set one and that's fine — the
/// adapter sends no `Authorization` header when `api_key` is `None`.
fn api_key_for(provider_id: &str) -> Option<String> {
    std::env::var(format!("{}_API_KEY", provider_id.to_uppercase())).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_env_var_name_is_uppercased_provider_id() {
        std::env::set_var("TESTPROV_API_KEY", "secret");
        assert_eq!(api_key_for("testprov"), Some("secret".to_string()));
        std::env::remove_var("TESTPROV_API_KEY");
    }

    #[test]
    fn api_key_absent_when_unset() {
        std::env::remove_var("NOSUCHPROVIDER_API_KEY");
        assert_eq!(api_key_for("nosuchprovider"), None);
    }
}
