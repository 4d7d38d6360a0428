use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use msgcode_core::error::Result;
use msgcode_route::{RouteStore, StateStore};
use msgcode_transport::TransportAdapter;

use crate::actor::{turn_from_message, ChatActorRegistry};
use crate::gate::DedupRateGate;

/// Checks whether a normalized sender identity is allowed to drive the
/// runtime via an `isFromMe` message. Implemented by `msgcode-users`;
/// injected here to avoid a circular crate dependency.
pub trait OwnerWhitelist: Send + Sync {
    fn is_whitelisted(&self, identity: &str) -> bool;
}

pub struct IngressLoopConfig {
    pub tick: Duration,
}

impl Default for IngressLoopConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(2),
        }
    }
}

/// Polls the Transport Adapter on a fixed tick, filters by cursor and the
/// Dedup & Rate Gate, and dispatches surviving messages into per-chat FIFO
/// actors.
pub struct IngressLoop {
    transport: Arc<TransportAdapter>,
    state_store: Arc<StateStore>,
    route_store: Arc<RouteStore>,
    gate: Arc<DedupRateGate>,
    actors: Arc<ChatActorRegistry>,
    owner_whitelist: Arc<dyn OwnerWhitelist>,
    config: IngressLoopConfig,
}

impl IngressLoop {
    pub fn new(
        transport: Arc<TransportAdapter>,
        state_store: Arc<StateStore>,
        route_store: Arc<RouteStore>,
        gate: Arc<DedupRateGate>,
        actors: Arc<ChatActorRegistry>,
        owner_whitelist: Arc<dyn OwnerWhitelist>,
        config: IngressLoopConfig,
    ) -> Self {
        Self {
            transport,
            state_store,
            route_store,
            gate,
            actors,
            owner_whitelist,
            config,
        }
    }

    /// Run forever, honoring `cancel` for clean shutdown (e.g. `/stop`).
    pub async fn run(&self, cancel: tokio_util::sync::CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("ingress loop cancelled");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick_once().await {
                        warn!(error = %e, "ingress tick failed");
                    }
                }
            }
        }
    }

    async fn tick_once(&self) -> Result<()> {
        let routes = self.route_store.list()?;
        for route in routes.into_iter().filter(|r| r.is_active()) {
            self.poll_chat(&route.chat_id).await?;
        }
        Ok(())
    }

    async fn poll_chat(&self, chat_id: &str) -> Result<()> {
        let state = self.state_store.get(chat_id)?;
        let overlap = self.config.tick.min(Duration::from_secs(1));
        let since = (state.last_seen_rowid - overlap.as_secs() as i64).max(0);

        let messages = self.transport.list(since).await?;
        for message in messages
            .into_iter()
            .filter(|m| m.rowid > state.last_seen_rowid)
        {
            if message.is_from_me && !self.owner_whitelist.is_whitelisted(&message.sender_id) {
                continue;
            }
            if self.gate.check_and_record_id(&message.id) {
                continue;
            }
            if self
                .gate
                .check_and_record_content(&message.chat_id, &message.text)
            {
                continue;
            }
            if !self.gate.try_acquire(&message.chat_id) {
                warn!(chat = %message.chat_id, "rate limited, dropping message");
                continue;
            }

            self.state_store.advance(
                &message.chat_id,
                message.rowid,
                message.id.clone(),
                Utc::now(),
            )?;
            self.actors.enqueue(turn_from_message(&message)).await;
        }
        Ok(())
    }
}
