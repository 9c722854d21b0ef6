//! Authorization policy for cross-guild ban operations.
//!
//! A member may pull, push or sync against a target guild if they are an
//! administrator with ban rights in the target, or if the target has
//! whitelisted the member's home guild for that direction.

use crate::error::SyncResult;
use crate::platform::GuildPlatform;
use crate::policy_store::{PeerList, PolicyStore};
use bansync_types::{GuildId, Operation, UserId};
use std::sync::Arc;
use tracing::debug;

/// The member invoking an operation, seen from their home guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// The member's user id.
    pub user: UserId,
    /// The guild the member is acting from. This is the source guild of a
    /// reconciliation.
    pub guild: GuildId,
    /// Display name used in audit log reasons.
    pub name: String,
}

impl Actor {
    pub fn new(user: UserId, guild: GuildId, name: impl Into<String>) -> Self {
        Self {
            user,
            guild,
            name: name.into(),
        }
    }

    /// Reason attached to bans issued by a manual run.
    pub fn manual_reason(&self) -> String {
        format!("Manual Ban Sync issued by {} ({})", self.name, self.user)
    }
}

/// Decides whether an actor may run an operation against a target guild.
pub struct AuthorizationPolicy {
    platform: Arc<dyn GuildPlatform>,
    store: PolicyStore,
}

impl AuthorizationPolicy {
    pub fn new(platform: Arc<dyn GuildPlatform>, store: PolicyStore) -> Self {
        Self { platform, store }
    }

    /// Returns whether `actor` may run `operation` against `target`.
    ///
    /// Admins with ban rights in the target are always allowed. Otherwise
    /// Pull needs the actor's guild in the target's pull list, Push needs it
    /// in the target's push list, and Sync needs both.
    pub async fn is_allowed(
        &self,
        operation: Operation,
        actor: &Actor,
        target: GuildId,
    ) -> SyncResult<bool> {
        if let Some(perms) = self.platform.member_permissions(target, actor.user).await? {
            if perms.is_ban_admin() {
                debug!("{} is a ban admin in {}, allowing {}", actor.user, target, operation);
                return Ok(true);
            }
        }

        let allow_pull = self
            .store
            .contains(target, PeerList::AllowPullFrom, actor.guild)?;
        let allow_push = self
            .store
            .contains(target, PeerList::AllowPushTo, actor.guild)?;

        let allowed = match operation {
            Operation::Pull => allow_pull,
            Operation::Push => allow_push,
            Operation::Sync => allow_pull && allow_push,
        };
        debug!(
            "{} from {} -> {} on {}: pull={} push={} allowed={}",
            operation, actor.guild, target, actor.user, allow_pull, allow_push, allowed
        );
        Ok(allowed)
    }
}
