//! Process wiring: construct every component crate and run them to
//! completion. There is no inbound server to route to — the `Runtime` here owns the
//! background tasks (Ingress Loop, Scheduler Engine, fired-job forwarder)
//! and runs until cancelled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use msgcode_agent::runtime::RuntimeOrchestrator;
use msgcode_agent::tool_bus::ToolBus;
use msgcode_agent::tools::bash::BashTool;
use msgcode_agent::tools::desktop::DesktopTool;
use msgcode_agent::tools::edit_file::EditFileTool;
use msgcode_agent::tools::read_file::ReadFileTool;
use msgcode_agent::tools::write_file::WriteFileTool;
use msgcode_agent::tools::Tool;
use msgcode_agent::window::ConversationWindow;
use msgcode_core::config::RuntimeConfig;
use msgcode_core::types::{ChatId, RequestId, TurnSource};
use msgcode_hooks::HookEngine;
use msgcode_ingress::{
    ChatActorRegistry, DedupRateGate, IngressLoop, IngressLoopConfig, TurnContext,
};
use msgcode_route::{RouteStore, StateStore};
use msgcode_scheduler::{SchedulerEngine, SchedulerHandle};
use msgcode_sessionpool::SessionPool;
use msgcode_terminal::ClientPipeline;
use msgcode_transport::TransportAdapter;
use msgcode_users::{OwnerConfig, StaticOwnerWhitelist};

use crate::lifecycle;

const DEFAULT_TRANSPORT_BIN: &str = "imsg";
const DEFAULT_DESKTOPCTL_BIN: &str = "desktopctl";
const DEDUP_BUCKET_CAPACITY: u32 = 4;
const DEDUP_BUCKET_REFILL: Duration = Duration::from_secs(2);
const CROSS_CHAT_CONCURRENCY: usize = 8;

/// Everything `start` needs to run and `stop`/`allstop` need to tear down.
/// Holding the pieces here (rather than just spawning and forgetting) keeps
/// shutdown orderly: cancel ingress first, let in-flight turns finish, then
/// stop the scheduler.
pub struct Runtime {
    ingress: Arc<IngressLoop>,
    scheduler_engine: SchedulerEngine,
    fired_rx: mpsc::Receiver<msgcode_scheduler::FiredJob>,
    actors: Arc<ChatActorRegistry>,
    cancel: CancellationToken,
    shutdown_tx: watch::Sender<bool>,
}

/// `MSGCODE_TRANSPORT_PATH` > `IMSG_PATH` (`config.imsg_path`) > the bundled
/// default binary name, resolved from `$PATH` at spawn time.
pub fn resolve_transport_bin(config: &RuntimeConfig) -> String {
    std::env::var("MSGCODE_TRANSPORT_PATH")
        .ok()
        .or_else(|| config.imsg_path.clone().map(|p| p.display().to_string()))
        .unwrap_or_else(|| DEFAULT_TRANSPORT_BIN.to_string())
}

impl Runtime {
    pub fn build(config: RuntimeConfig) -> Result<Self> {
        let config_dir = lifecycle::config_dir();
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("creating {}", config_dir.display()))?;

        let workspace_root = config
            .workspace_root
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let routes = Arc::new(RouteStore::open(&config_dir, workspace_root.clone())?);
        let state = Arc::new(StateStore::open(&config_dir)?);

        let schedule_handle = SchedulerHandle::open(config_dir.join("schedules.json"))?;
        let scheduler_for_orchestrator = Arc::new(schedule_handle.clone());
        let (fired_tx, fired_rx) = mpsc::channel(32);
        let scheduler_engine = SchedulerEngine::new(schedule_handle, fired_tx);

        let hooks = Arc::new(HookEngine::new());
        let window = Arc::new(ConversationWindow::new());

        let desktopctl_bin = config
            .desktopctl_path
            .clone()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| DEFAULT_DESKTOPCTL_BIN.to_string());
        let session_pool = Arc::new(SessionPool::new(desktopctl_bin));

        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(ReadFileTool),
            Box::new(WriteFileTool),
            Box::new(EditFileTool),
            Box::new(BashTool::default()),
            Box::new(DesktopTool::new(session_pool.clone())),
        ];
        let tool_bus = Arc::new(ToolBus::new(tools, hooks.clone(), session_pool.clone()));

        let transport = Arc::new(TransportAdapter::new(resolve_transport_bin(&config)));

        let client_pipeline = Arc::new(ClientPipeline::new(None));

        let orchestrator = Arc::new(RuntimeOrchestrator::new(
            routes.clone(),
            state.clone(),
            window,
            tool_bus,
            hooks,
            scheduler_for_orchestrator,
            transport.clone(),
            client_pipeline,
            workspace_root,
        ));

        let actors = Arc::new(ChatActorRegistry::new(CROSS_CHAT_CONCURRENCY, orchestrator));

        let owner_config = OwnerConfig::new(&config.owner, config.owner_only_in_group);
        let owner_whitelist = Arc::new(StaticOwnerWhitelist::new(owner_config));

        let gate = Arc::new(DedupRateGate::new(DEDUP_BUCKET_CAPACITY, DEDUP_BUCKET_REFILL));
        let ingress = Arc::new(IngressLoop::new(
            transport,
            state,
            routes,
            gate,
            actors.clone(),
            owner_whitelist,
            IngressLoopConfig::default(),
        ));

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            ingress,
            scheduler_engine,
            fired_rx,
            actors,
            cancel: CancellationToken::new(),
            shutdown_tx,
        })
    }

    /// Run until `ctrl_c` or an external cancellation (`/stop` CLI verb
    /// sending SIGTERM, handled by the default Tokio signal behavior)
    /// arrives. Returns once every background task has wound down.
    pub async fn run(self) -> Result<()> {
        let ingress_cancel = self.cancel.clone();
        let ingress = self.ingress.clone();
        let ingress_task = tokio::spawn(async move { ingress.run(ingress_cancel).await });

        let shutdown_rx = self.shutdown_tx.subscribe();
        let scheduler_task = tokio::spawn(self.scheduler_engine.run(shutdown_rx));

        let actors = self.actors.clone();
        let mut fired_rx = self.fired_rx;
        let fired_forward_cancel = self.cancel.clone();
        let fired_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = fired_forward_cancel.cancelled() => break,
                    fired = fired_rx.recv() => {
                        let Some(fired) = fired else { break };
                        actors
                            .enqueue(TurnContext {
                                chat_id: ChatId::from(fired.chat_id),
                                request_id: RequestId::new(),
                                text: fired.message,
                                source: TurnSource::Schedule,
                            })
                            .await;
                    }
                }
            }
        });

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c, shutting down");
            }
        }

        self.cancel.cancel();
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = ingress_task.await {
            warn!("ingress task panicked: {e}");
        }
        if let Err(e) = fired_task.await {
            warn!("scheduler forward task panicked: {e}");
        }
        if let Err(e) = scheduler_task.await {
            warn!("scheduler engine task panicked: {e}");
        }

        Ok(())
    }
}
