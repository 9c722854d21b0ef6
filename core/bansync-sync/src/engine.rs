//! Reconciliation engine that converges two ban lists.
//!
//! A run fetches both lists, computes what each side is missing for the
//! requested direction(s), and bans the difference one entry at a time.
//! Runs are idempotent: entries already banned on both sides are skipped.

use crate::error::{SyncError, SyncResult};
use crate::platform::GuildPlatform;
use crate::policy::Actor;
use crate::stats::{OperationStats, Outcome};
use bansync_types::{GuildId, Operation, UserId};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Applies pull/push/sync between an actor's guild and a target guild.
pub struct ReconcileEngine {
    platform: Arc<dyn GuildPlatform>,
    /// Days of messages purged with each ban.
    delete_message_days: u8,
    /// One lock per unordered guild pair; concurrent runs on the same pair
    /// are serialized.
    pair_locks: Mutex<HashMap<(GuildId, GuildId), Arc<tokio::sync::Mutex<()>>>>,
}

impl ReconcileEngine {
    pub fn new(platform: Arc<dyn GuildPlatform>, delete_message_days: u8) -> Self {
        Self {
            platform,
            delete_message_days,
            pair_locks: Mutex::new(HashMap::new()),
        }
    }

    fn pair_key(a: GuildId, b: GuildId) -> (GuildId, GuildId) {
        if a <= b { (a, b) } else { (b, a) }
    }

    fn pair_lock(&self, key: (GuildId, GuildId)) -> Arc<tokio::sync::Mutex<()>> {
        self.pair_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone()
    }

    /// Drops a pair's lock entry once no other run holds or waits on it.
    fn release_pair(&self, key: (GuildId, GuildId), lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.pair_locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(&key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&key);
        }
    }

    /// Number of guild pairs with a run in progress or waiting.
    pub fn active_pairs(&self) -> usize {
        self.pair_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Runs `operation` between `actor.guild` (source) and `target`.
    ///
    /// Fails with [`SyncError::MissingBanPermission`] before touching either
    /// list if we cannot ban in the target. Individual rejected bans are
    /// counted as failures and do not stop the run.
    pub async fn reconcile(
        &self,
        operation: Operation,
        actor: &Actor,
        target: GuildId,
        reason: &str,
    ) -> SyncResult<OperationStats> {
        let key = Self::pair_key(actor.guild, target);
        let lock = self.pair_lock(key);
        let guard = lock.lock().await;
        let result = self.run(operation, actor, target, reason).await;
        drop(guard);
        self.release_pair(key, lock);
        result
    }

    async fn run(
        &self,
        operation: Operation,
        actor: &Actor,
        target: GuildId,
        reason: &str,
    ) -> SyncResult<OperationStats> {
        let source = actor.guild;

        if !self.platform.bot_can_ban(target).await? {
            warn!("Cannot {} with {}: missing ban permission", operation, target);
            return Err(SyncError::MissingBanPermission { guild: target });
        }

        info!("Starting {} between {} and {} for {}", operation, source, target, actor.user);

        let source_bans = self.ban_set(source).await?;
        let target_bans = self.ban_set(target).await?;
        let mut stats = OperationStats::new();

        if operation.pulls() {
            let missing: Vec<UserId> = target_bans.difference(&source_bans).copied().collect();
            debug!("{} bans to pull from {} into {}", missing.len(), target, source);
            self.apply(source, &missing, reason, Outcome::Pulled, Outcome::FailedPull, &mut stats)
                .await?;
        }

        if operation.pushes() {
            let missing: Vec<UserId> = source_bans.difference(&target_bans).copied().collect();
            debug!("{} bans to push from {} into {}", missing.len(), source, target);
            self.apply(target, &missing, reason, Outcome::Pushed, Outcome::FailedPush, &mut stats)
                .await?;
        }

        info!(
            "Finished {} between {} and {}: {} attempted, {} failed",
            operation,
            source,
            target,
            stats.total(),
            stats.failures()
        );
        Ok(stats)
    }

    async fn ban_set(&self, guild: GuildId) -> SyncResult<BTreeSet<UserId>> {
        Ok(self
            .platform
            .bans(guild)
            .await?
            .into_iter()
            .map(|entry| entry.user)
            .collect())
    }

    async fn apply(
        &self,
        guild: GuildId,
        users: &[UserId],
        reason: &str,
        ok: Outcome,
        failed: Outcome,
        stats: &mut OperationStats,
    ) -> SyncResult<()> {
        for user in users {
            match self
                .platform
                .ban(guild, *user, reason, self.delete_message_days)
                .await
            {
                Ok(()) => stats.record(ok),
                Err(e) if e.is_remote_rejection() => {
                    warn!("Failed to ban {} in {}: {}", user, guild, e);
                    stats.record(failed);
                }
                Err(e) => {
                    warn!(
                        "Stopping bans into {} after {} attempted, {} failed: {}",
                        guild,
                        stats.total(),
                        stats.failures(),
                        e
                    );
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
