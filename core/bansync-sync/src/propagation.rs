//! Live ban propagation.
//!
//! Ban and unban events observed in a guild are queued and replicated, one
//! event at a time, to every peer in that guild's push list. Deliveries to
//! successive peers are separated by a fixed pacing delay to stay clear of
//! platform rate limits. Outcomes are reported to the operations log only;
//! nothing is returned to whoever caused the event.

use crate::config::BanSyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::notify::{Notification, OpsLog};
use crate::platform::GuildPlatform;
use crate::policy_store::{PeerList, PolicyStore};
use bansync_types::{BanEvent, BanEventKind, GuildId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What happened when delivering an event to one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The ban or unban was applied.
    Replicated,
    /// The peer was already in the desired state; nothing was sent.
    AlreadyInSync,
    /// We lack ban rights in the peer.
    NotAuthorized,
    /// The platform rejected the call.
    Failed { status: Option<u16> },
    /// The peer id no longer resolves to a guild we can see.
    UnknownPeer,
}

/// Delivery outcome for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDelivery {
    pub peer: GuildId,
    pub delivery: Delivery,
}

/// Replicates live ban events to peer guilds.
pub struct Propagator {
    platform: Arc<dyn GuildPlatform>,
    store: PolicyStore,
    ops_log: OpsLog,
    pacing: Duration,
    delete_message_days: u8,
}

impl Propagator {
    pub fn new(platform: Arc<dyn GuildPlatform>, store: PolicyStore, config: &BanSyncConfig) -> Self {
        let ops_log = OpsLog::new(platform.clone(), config.ops_log_channel);
        Self {
            platform,
            store,
            ops_log,
            pacing: config.pacing(),
            delete_message_days: config.delete_message_days,
        }
    }

    /// Starts the single worker that drains the event queue in order.
    pub fn spawn(self, capacity: usize) -> (PropagatorHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<BanEvent>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = self.handle_event(&event).await {
                    warn!(
                        "Propagation of {} for {} from {} aborted: {}",
                        event.kind, event.user, event.guild, e
                    );
                }
            }
            debug!("Propagation queue closed");
        });
        (PropagatorHandle { tx }, worker)
    }

    /// Replicates one event to every peer in the origin guild's push list.
    pub async fn handle_event(&self, event: &BanEvent) -> SyncResult<Vec<PeerDelivery>> {
        let peers = self.store.list(event.guild, PeerList::AllowPushTo)?;
        if peers.is_empty() {
            return Ok(Vec::new());
        }

        let source_name = match self.platform.guild_name(event.guild).await {
            Ok(Some(name)) => name,
            Ok(None) => event.guild.to_string(),
            Err(e) => {
                debug!("Could not resolve origin {}: {}", event.guild, e);
                event.guild.to_string()
            }
        };
        let reason = match event.kind {
            BanEventKind::Created => self.original_reason(event).await,
            BanEventKind::Lifted => None,
        };

        info!(
            "Propagating {} of {} from {} to {} peer(s)",
            event.kind,
            event.user,
            event.guild,
            peers.len()
        );

        let mut deliveries = Vec::with_capacity(peers.len());
        for (i, peer) in peers.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pacing).await;
            }
            let delivery = self
                .deliver(event, peer, &source_name, reason.as_deref())
                .await;
            debug!("{} of {} to {}: {:?}", event.kind, event.user, peer, delivery);
            deliveries.push(PeerDelivery { peer, delivery });
        }
        Ok(deliveries)
    }

    /// The ban reason carried by the event, or fetched from the origin guild.
    async fn original_reason(&self, event: &BanEvent) -> Option<String> {
        if event.reason.is_some() {
            return event.reason.clone();
        }
        match self.platform.fetch_ban(event.guild, event.user).await {
            Ok(ban) => ban.and_then(|b| b.reason),
            Err(e) => {
                debug!("Could not fetch ban reason for {}: {}", event.user, e);
                None
            }
        }
    }

    async fn deliver(
        &self,
        event: &BanEvent,
        peer: GuildId,
        source_name: &str,
        reason: Option<&str>,
    ) -> Delivery {
        let target_name = match self.platform.guild_name(peer).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                warn!("Push peer {} of {} is not visible, skipping", peer, event.guild);
                return Delivery::UnknownPeer;
            }
            Err(e) => return self.failed(event, source_name, &peer.to_string(), e).await,
        };

        match self.platform.bot_can_ban(peer).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Not authorized to ban in {} ({})", target_name, peer);
                self.ops_log
                    .notify(&Notification::fatal(event.kind, event.user, source_name, &target_name))
                    .await;
                return Delivery::NotAuthorized;
            }
            Err(e) => return self.failed(event, source_name, &target_name, e).await,
        }

        let banned = match self.platform.fetch_ban(peer, event.user).await {
            Ok(ban) => ban.is_some(),
            Err(e) => return self.failed(event, source_name, &target_name, e).await,
        };

        let result = match event.kind {
            BanEventKind::Created if banned => return Delivery::AlreadyInSync,
            BanEventKind::Lifted if !banned => return Delivery::AlreadyInSync,
            BanEventKind::Created => {
                let annotated = format!(
                    "{} <{}>",
                    reason.unwrap_or("No reason provided"),
                    source_name
                );
                self.platform
                    .ban(peer, event.user, &annotated, self.delete_message_days)
                    .await
            }
            BanEventKind::Lifted => {
                let annotated = format!("Globally unbanned from <{source_name}>");
                self.platform.unban(peer, event.user, &annotated).await
            }
        };

        match result {
            Ok(()) => {
                self.ops_log
                    .notify(&Notification::success(
                        event.kind,
                        event.user,
                        source_name,
                        &target_name,
                        reason.map(str::to_string),
                    ))
                    .await;
                Delivery::Replicated
            }
            Err(e) => self.failed(event, source_name, &target_name, e).await,
        }
    }

    async fn failed(
        &self,
        event: &BanEvent,
        source_name: &str,
        target_name: &str,
        error: SyncError,
    ) -> Delivery {
        warn!(
            "{} of {} from {} to {} failed: {}",
            event.kind, event.user, source_name, target_name, error
        );
        self.ops_log
            .notify(&Notification::warning(
                event.kind,
                event.user,
                source_name,
                target_name,
                &error,
            ))
            .await;
        Delivery::Failed {
            status: error.status_code(),
        }
    }
}

/// Handle used to enqueue events for the propagation worker.
#[derive(Clone)]
pub struct PropagatorHandle {
    tx: mpsc::Sender<BanEvent>,
}

impl PropagatorHandle {
    /// Enqueues an event, waiting for queue space.
    pub async fn submit(&self, event: BanEvent) -> SyncResult<()> {
        self.tx.send(event).await.map_err(|_| SyncError::ChannelClosed)
    }

    /// Enqueues an event without waiting. Fails if the queue is full or closed.
    pub fn try_submit(&self, event: BanEvent) -> SyncResult<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                SyncError::QueueFull("propagation".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => SyncError::ChannelClosed,
        })
    }
}
