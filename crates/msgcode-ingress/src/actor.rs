use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

use msgcode_core::error::Result;
use msgcode_core::types::{ChatId, RequestId, TurnSource};
use msgcode_transport::Message;

use crate::intervention::ChatIntervention;

const CHAT_QUEUE_CAPACITY: usize = 32;
const IDLE_REAP_AFTER: Duration = Duration::from_secs(600);

/// One turn entering the Orchestrator: either a freshly polled message, a
/// schedule-sourced fire, or a follow-up re-entry.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub chat_id: ChatId,
    pub request_id: RequestId,
    pub text: String,
    pub source: TurnSource,
}

/// Implemented by the Runtime Orchestrator (`msgcode-agent`). Kept as a
/// trait here so the Ingress Loop never depends on the agent crate — it
/// only knows it has *something* to hand a turn to.
#[async_trait]
pub trait TurnHandler: Send + Sync {
    async fn handle_turn(&self, ctx: TurnContext, intervention: Arc<ChatIntervention>) -> Result<()>;
}

/// Lazily spawns one Tokio task per chat, each owning a bounded `mpsc`
/// receiver so turns for a single chat always run strictly in order. Tasks
/// idle-reap after `IDLE_REAP_AFTER` with no new work; a later message for
/// the same chat simply respawns the actor.
pub struct ChatActorRegistry {
    senders: DashMap<String, mpsc::Sender<TurnContext>>,
    cross_chat_limit: Arc<Semaphore>,
    handler: Arc<dyn TurnHandler>,
    intervention: Arc<crate::intervention::InterventionRegistry>,
}

impl ChatActorRegistry {
    pub fn new(cross_chat_concurrency: usize, handler: Arc<dyn TurnHandler>) -> Self {
        Self {
            senders: DashMap::new(),
            cross_chat_limit: Arc::new(Semaphore::new(cross_chat_concurrency)),
            handler,
            intervention: Arc::new(crate::intervention::InterventionRegistry::new()),
        }
    }

    pub fn intervention_registry(&self) -> Arc<crate::intervention::InterventionRegistry> {
        self.intervention.clone()
    }

    /// Enqueue a turn for `chat_id`, spawning the chat's actor task if it
    /// isn't already running. Never blocks the caller past the channel's
    /// backpressure threshold.
    pub async fn enqueue(&self, ctx: TurnContext) {
        let chat_id = ctx.chat_id.as_str().to_string();
        loop {
            if let Some(sender) = self.senders.get(&chat_id) {
                match sender.send(ctx.clone()).await {
                    Ok(()) => return,
                    Err(_) => {
                        drop(sender);
                        self.senders.remove(&chat_id);
                        continue;
                    }
                }
            }
            self.spawn_actor(&chat_id);
        }
    }

    fn spawn_actor(&self, chat_id: &str) {
        let (tx, mut rx) = mpsc::channel::<TurnContext>(CHAT_QUEUE_CAPACITY);
        self.senders.insert(chat_id.to_string(), tx);

        let handler = self.handler.clone();
        let limit = self.cross_chat_limit.clone();
        let chat_intervention = self.intervention.get_or_create(chat_id);
        let chat_id_owned = chat_id.to_string();
        let senders_key = chat_id_owned.clone();

        tokio::spawn(async move {
            loop {
                let ctx = match tokio::time::timeout(IDLE_REAP_AFTER, rx.recv()).await {
                    Ok(Some(ctx)) => ctx,
                    Ok(None) => break,
                    Err(_) => {
                        debug!(chat = %senders_key, "chat actor idle timeout, reaping");
                        break;
                    }
                };
                let _permit = limit.acquire().await.expect("semaphore never closed");
                if let Err(e) = handler.handle_turn(ctx, chat_intervention.clone()).await {
                    warn!(chat = %chat_id_owned, error = %e, "turn handling failed");
                }
            }
        });
    }

    /// Drop the sender for an idle-reaped chat so the registry doesn't leak
    /// entries for chats that have gone quiet; called by the reaping task
    /// itself is not possible (no handle back), so this is invoked lazily
    /// the next time `enqueue` finds a closed channel.
    pub fn forget(&self, chat_id: &str) {
        self.senders.remove(chat_id);
    }
}

/// Turn a raw transport [`Message`] into a [`TurnContext`] with a fresh
/// request id.
pub fn turn_from_message(message: &Message) -> TurnContext {
    TurnContext {
        chat_id: ChatId::from(message.chat_id.clone()),
        request_id: RequestId::new(),
        text: message.text.clone(),
        source: TurnSource::User,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TurnHandler for CountingHandler {
        async fn handle_turn(
            &self,
            _ctx: TurnContext,
            _intervention: Arc<ChatIntervention>,
        ) -> Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn enqueue_processes_turns_in_order() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler {
            count: count.clone(),
        });
        let registry = ChatActorRegistry::new(4, handler);

        for i in 0..3 {
            registry
                .enqueue(TurnContext {
                    chat_id: ChatId::from("chat-1"),
                    request_id: RequestId::new(),
                    text: format!("turn {i}"),
                    source: TurnSource::User,
                })
                .await;
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
