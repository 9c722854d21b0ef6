//! Command service: the text command surface over policy, store and engine.
//!
//! Every command replies with human-readable text. Replies are sent to the
//! invoking channel as they are produced, so multi-target commands report
//! progress per target, and are also returned to the caller in order.

use crate::config::BanSyncConfig;
use crate::engine::ReconcileEngine;
use crate::error::{SyncError, SyncResult};
use crate::platform::GuildPlatform;
use crate::policy::{Actor, AuthorizationPolicy};
use crate::policy_store::{PeerList, PolicyStore};
use crate::stats::OperationStats;
use bansync_types::{ChannelId, GuildId, Operation, UserId};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

const NOT_ADMIN: &str = "You need to be an administrator of this server to use ban sync commands.";

const FAKE_ADMIN: &str = "It seems that you have a role that is considered admin at bot level but \
    not the basic permissions that one would reasonably expect an admin to have.\n\
    To use these commands, other than the admin role, you need `administrator` \
    permissions OR `ban members`.\n\
    I cannot let you proceed until you properly configure permissions in this server.";

const BOT_CANNOT_BAN: &str = "I need the `Ban Members` permission in this server to do that.";

/// A parsed ban sync command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `pull <server>`, `push <server>` or `sync <server>`.
    Reconcile { operation: Operation, target: GuildId },
    /// Push to every server in this server's push list.
    PushAll,
    /// Pull from every server in the pull list, then push to the push list.
    SyncAll,
    /// `addpush <server>` / `addpull <server>`.
    AddPeer { list: PeerList, peer: GuildId },
    /// `removepush <server>` / `removepull <server>`.
    RemovePeer { list: PeerList, peer: GuildId },
    /// `clearpush` / `clearpull`.
    ClearPeers { list: PeerList },
    /// `showlists` (alias `showsettings`).
    ShowLists,
}

impl Command {
    /// Whether we need ban rights in the invoking guild to run this command.
    pub fn requires_bot_ban(&self) -> bool {
        matches!(self, Self::Reconcile { .. } | Self::PushAll | Self::SyncAll)
    }
}

impl FromStr for Command {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let name = words
            .next()
            .ok_or_else(|| SyncError::InvalidCommand("empty command".to_string()))?
            .to_ascii_lowercase();
        let arg = words.next();
        if let Some(extra) = words.next() {
            return Err(SyncError::InvalidCommand(format!("unexpected argument `{extra}`")));
        }

        let server = || -> SyncResult<GuildId> {
            let raw = arg.ok_or_else(|| {
                SyncError::InvalidCommand(format!("`{name}` requires a server id"))
            })?;
            Ok(GuildId::parse(raw)?)
        };

        let command = match name.as_str() {
            "pull" | "push" | "sync" => Self::Reconcile {
                operation: name.parse()?,
                target: server()?,
            },
            "pushall" => Self::PushAll,
            "syncall" => Self::SyncAll,
            "addpush" => Self::AddPeer {
                list: PeerList::AllowPushTo,
                peer: server()?,
            },
            "addpull" => Self::AddPeer {
                list: PeerList::AllowPullFrom,
                peer: server()?,
            },
            "removepush" => Self::RemovePeer {
                list: PeerList::AllowPushTo,
                peer: server()?,
            },
            "removepull" => Self::RemovePeer {
                list: PeerList::AllowPullFrom,
                peer: server()?,
            },
            "clearpush" => Self::ClearPeers {
                list: PeerList::AllowPushTo,
            },
            "clearpull" => Self::ClearPeers {
                list: PeerList::AllowPullFrom,
            },
            "showlists" | "showsettings" => Self::ShowLists,
            other => return Err(SyncError::InvalidCommand(format!("unknown command `{other}`"))),
        };
        Ok(command)
    }
}

/// Where a command was invoked and by whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub guild: GuildId,
    pub channel: ChannelId,
    pub author: UserId,
    pub author_name: String,
}

impl CommandContext {
    /// The invoker as an actor of their home guild.
    pub fn actor(&self) -> Actor {
        Actor::new(self.author, self.guild, self.author_name.clone())
    }
}

/// Sends replies to the invoking channel and keeps a transcript.
struct Replies {
    platform: Arc<dyn GuildPlatform>,
    channel: ChannelId,
    sent: Vec<String>,
}

impl Replies {
    async fn say(&mut self, text: impl Into<String>) -> SyncResult<()> {
        let text = text.into();
        self.platform.send_message(self.channel, &text).await?;
        self.sent.push(text);
        Ok(())
    }
}

/// Runs ban sync commands.
pub struct BanSyncService {
    platform: Arc<dyn GuildPlatform>,
    store: PolicyStore,
    policy: AuthorizationPolicy,
    engine: ReconcileEngine,
}

impl BanSyncService {
    pub fn new(platform: Arc<dyn GuildPlatform>, store: PolicyStore, config: &BanSyncConfig) -> Self {
        Self {
            policy: AuthorizationPolicy::new(platform.clone(), store.clone()),
            engine: ReconcileEngine::new(platform.clone(), config.delete_message_days),
            platform,
            store,
        }
    }

    /// Returns the policy store.
    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    /// Runs a command and returns the replies it sent, in order.
    pub async fn execute(&self, ctx: &CommandContext, command: Command) -> SyncResult<Vec<String>> {
        let mut replies = Replies {
            platform: self.platform.clone(),
            channel: ctx.channel,
            sent: Vec::new(),
        };
        debug!("{} in {} runs {:?}", ctx.author, ctx.guild, command);

        if let Some(refusal) = self.check_invoker(ctx).await? {
            replies.say(refusal).await?;
            return Ok(replies.sent);
        }
        if command.requires_bot_ban() && !self.platform.bot_can_ban(ctx.guild).await? {
            replies.say(BOT_CANNOT_BAN).await?;
            return Ok(replies.sent);
        }

        match command {
            Command::Reconcile { operation, target } => {
                self.reconcile_one(ctx, operation, target, &mut replies).await?;
            }
            Command::PushAll => self.push_all(ctx, &mut replies).await?,
            Command::SyncAll => self.sync_all(ctx, &mut replies).await?,
            Command::AddPeer { list, peer } => self.add_peer(ctx, list, peer, &mut replies).await?,
            Command::RemovePeer { list, peer } => {
                self.remove_peer(ctx, list, peer, &mut replies).await?;
            }
            Command::ClearPeers { list } => self.clear_peers(ctx, list, &mut replies).await?,
            Command::ShowLists => self.show_lists(ctx, &mut replies).await?,
        }
        Ok(replies.sent)
    }

    /// Returns a refusal message unless the invoker is an admin with ban
    /// rights in the invoking guild.
    async fn check_invoker(&self, ctx: &CommandContext) -> SyncResult<Option<&'static str>> {
        let perms = self.platform.member_permissions(ctx.guild, ctx.author).await?;
        Ok(match perms {
            Some(p) if p.is_ban_admin() => None,
            Some(p) if p.is_admin => Some(FAKE_ADMIN),
            _ => Some(NOT_ADMIN),
        })
    }

    async fn reconcile_one(
        &self,
        ctx: &CommandContext,
        operation: Operation,
        target: GuildId,
        replies: &mut Replies,
    ) -> SyncResult<()> {
        if self.platform.guild_name(target).await?.is_none() {
            return replies.say(format!("Server `{target}` not found.")).await;
        }

        let actor = ctx.actor();
        if !self.policy.is_allowed(operation, &actor, target).await? {
            let list = match operation {
                Operation::Pull => "pull",
                Operation::Push => "push",
                Operation::Sync => "push and/or pull",
            };
            return replies
                .say(format!("This server is not in that server's {list} list."))
                .await;
        }

        match self
            .engine
            .reconcile(operation, &actor, target, &actor.manual_reason())
            .await
        {
            Ok(stats) if stats.is_empty() => replies.say(format!("No bans to {operation}.")).await,
            Ok(stats) => replies.say(render(&stats)).await,
            Err(e @ SyncError::MissingBanPermission { .. }) => replies.say(e.to_string()).await,
            Err(e) => Err(e),
        }
    }

    async fn push_all(&self, ctx: &CommandContext, replies: &mut Replies) -> SyncResult<()> {
        let peers = self.store.list(ctx.guild, PeerList::AllowPushTo)?;
        info!("Global push from {} to {} peer(s)", ctx.guild, peers.len());

        replies.say(":warning: Commencing global ban push.").await?;
        if !self.run_batch(ctx, Operation::Push, &peers, replies).await? {
            return Ok(());
        }
        replies.say(":white_check_mark: Global ban push complete!").await
    }

    async fn sync_all(&self, ctx: &CommandContext, replies: &mut Replies) -> SyncResult<()> {
        let pull = self.store.list(ctx.guild, PeerList::AllowPullFrom)?;
        let push = self.store.list(ctx.guild, PeerList::AllowPushTo)?;
        info!(
            "Global sync for {}: {} pull peer(s), {} push peer(s)",
            ctx.guild,
            pull.len(),
            push.len()
        );

        replies.say(":warning: Commencing global sync.").await?;
        replies.say(":warning: Pulling all global bans from servers...").await?;
        if !self.run_batch(ctx, Operation::Pull, &pull, replies).await? {
            return Ok(());
        }
        replies.say(":warning: Pushing all global bans to servers...").await?;
        if !self.run_batch(ctx, Operation::Push, &push, replies).await? {
            return Ok(());
        }
        replies.say(":white_check_mark: Global ban sync complete!").await
    }

    /// Runs one operation against each peer in turn, reporting after each.
    /// Returns `false` if the batch was aborted by a missing permission.
    async fn run_batch(
        &self,
        ctx: &CommandContext,
        operation: Operation,
        peers: &[GuildId],
        replies: &mut Replies,
    ) -> SyncResult<bool> {
        let actor = ctx.actor();
        let reason = actor.manual_reason();

        for &peer in peers {
            let Some(name) = self.platform.guild_name(peer).await? else {
                replies
                    .say(format!(":grey_question: Skipping unknown server ({peer})."))
                    .await?;
                continue;
            };

            let (header, nothing) = match operation {
                Operation::Pull => (
                    format!(":inbox_tray: Pulling new bans from server: {name} ({peer})"),
                    format!(":ballot_box_with_check: No new bans to pull from {name} ({peer})."),
                ),
                _ => (
                    format!(":outbox_tray: Pushing new bans to server: {name} ({peer})"),
                    format!(":ballot_box_with_check: No new bans to push to {name} ({peer})."),
                ),
            };
            replies.say(header).await?;

            match self.engine.reconcile(operation, &actor, peer, &reason).await {
                Ok(stats) if stats.is_empty() => replies.say(nothing).await?,
                Ok(stats) => replies.say(render(&stats)).await?,
                Err(e @ SyncError::MissingBanPermission { .. }) => {
                    replies.say(e.to_string()).await?;
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    async fn add_peer(
        &self,
        ctx: &CommandContext,
        list: PeerList,
        peer: GuildId,
        replies: &mut Replies,
    ) -> SyncResult<()> {
        let Some(name) = self.platform.guild_name(peer).await? else {
            return replies.say(format!("Server `{peer}` not found.")).await;
        };
        self.store.add(ctx.guild, list, peer)?;
        let text = match list {
            PeerList::AllowPushTo => {
                format!("`{name}` will now be allowed to **push** bans to this server.")
            }
            PeerList::AllowPullFrom => {
                format!("`{name}` will now be allowed to **pull** bans from this server.")
            }
        };
        replies.say(text).await
    }

    /// Peers that no longer resolve can still be removed by id.
    async fn remove_peer(
        &self,
        ctx: &CommandContext,
        list: PeerList,
        peer: GuildId,
        replies: &mut Replies,
    ) -> SyncResult<()> {
        let name = self
            .platform
            .guild_name(peer)
            .await?
            .unwrap_or_else(|| peer.to_string());
        self.store.remove(ctx.guild, list, peer)?;
        let text = match list {
            PeerList::AllowPushTo => format!(
                "`{name}` has been removed from the list of servers allowed to **push** bans to \
                 this server."
            ),
            PeerList::AllowPullFrom => format!(
                "`{name}` has been removed from the list of servers allowed to **pull** bans from \
                 this server."
            ),
        };
        replies.say(text).await
    }

    async fn clear_peers(
        &self,
        ctx: &CommandContext,
        list: PeerList,
        replies: &mut Replies,
    ) -> SyncResult<()> {
        self.store.clear(ctx.guild, list)?;
        let text = match list {
            PeerList::AllowPushTo => {
                "Push list cleared. Only local admins are now allowed to push bans to this \
                 server from elsewhere."
            }
            PeerList::AllowPullFrom => {
                "Pull list cleared. Only local admins are now allowed to pull bans from this \
                 server from elsewhere."
            }
        };
        replies.say(text).await
    }

    async fn show_lists(&self, ctx: &CommandContext, replies: &mut Replies) -> SyncResult<()> {
        let pull = self.display_names(ctx.guild, PeerList::AllowPullFrom).await?;
        let push = self.display_names(ctx.guild, PeerList::AllowPushTo).await?;
        replies.say(format!("Pull: {pull}\nPush: {push}")).await
    }

    /// Renders a peer list for display, silently dropping peers that no
    /// longer resolve.
    async fn display_names(&self, guild: GuildId, list: PeerList) -> SyncResult<String> {
        let mut names = Vec::new();
        for peer in self.store.list(guild, list)? {
            match self.platform.guild_name(peer).await {
                Ok(Some(name)) => names.push(format!("`{name}`")),
                Ok(None) => {}
                Err(e) => debug!("Dropping {} from display: {}", peer, e),
            }
        }
        Ok(if names.is_empty() {
            "None".to_string()
        } else {
            names.join(", ")
        })
    }
}

fn render(stats: &OperationStats) -> String {
    stats.to_string().trim_end().to_string()
}
