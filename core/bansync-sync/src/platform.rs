//! Chat platform abstraction.
//!
//! Everything the sync core needs from the chat platform goes through the
//! [`GuildPlatform`] trait, so the engine and the propagation worker can run
//! against the Discord REST API or an in-memory mock.

use crate::error::SyncResult;
use async_trait::async_trait;
use bansync_types::{BanEntry, ChannelId, GuildId, UserId};
use serde::{Deserialize, Serialize};

/// What a member may do in a guild, as far as ban sync is concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPermissions {
    /// The member counts as an administrator (owner, administrator
    /// permission, or a configured admin role).
    pub is_admin: bool,
    /// The member holds the ban members permission.
    pub ban_members: bool,
}

impl MemberPermissions {
    /// Administrator with ban rights.
    pub const ADMIN: Self = Self {
        is_admin: true,
        ban_members: true,
    };

    /// Whether the member is an administrator that can actually ban.
    pub fn is_ban_admin(&self) -> bool {
        self.is_admin && self.ban_members
    }
}

/// Access to guilds, their ban lists and member permissions.
#[async_trait]
pub trait GuildPlatform: Send + Sync {
    /// Returns the name of the platform backend.
    fn platform_name(&self) -> &'static str;

    /// Resolves a guild id to its display name, or `None` if the guild is
    /// not visible to us.
    async fn guild_name(&self, guild: GuildId) -> SyncResult<Option<String>>;

    /// Fetches the full ban list of a guild.
    async fn bans(&self, guild: GuildId) -> SyncResult<Vec<BanEntry>>;

    /// Fetches a single ban, or `None` if the user is not banned.
    async fn fetch_ban(&self, guild: GuildId, user: UserId) -> SyncResult<Option<BanEntry>>;

    /// Bans a user, purging `delete_message_days` of their messages.
    async fn ban(
        &self,
        guild: GuildId,
        user: UserId,
        reason: &str,
        delete_message_days: u8,
    ) -> SyncResult<()>;

    /// Lifts a ban.
    async fn unban(&self, guild: GuildId, user: UserId, reason: &str) -> SyncResult<()>;

    /// Looks up a member's permissions, or `None` if the user is not a
    /// member of the guild.
    async fn member_permissions(
        &self,
        guild: GuildId,
        user: UserId,
    ) -> SyncResult<Option<MemberPermissions>>;

    /// Whether we hold the ban members permission in the guild.
    async fn bot_can_ban(&self, guild: GuildId) -> SyncResult<bool>;

    /// Sends a text message to a channel.
    async fn send_message(&self, channel: ChannelId, content: &str) -> SyncResult<()>;
}

/// An in-memory platform for testing.
pub mod mock {
    use super::*;
    use crate::error::SyncError;
    use std::collections::{BTreeMap, BTreeSet, HashMap};
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use tokio::time::Instant;

    /// A call made against the mock, recorded in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum PlatformCall {
        Bans(GuildId),
        FetchBan(GuildId, UserId),
        Ban {
            guild: GuildId,
            user: UserId,
            reason: String,
            delete_message_days: u8,
        },
        Unban {
            guild: GuildId,
            user: UserId,
            reason: String,
        },
        BotCanBan(GuildId),
    }

    impl PlatformCall {
        /// Whether this call mutates a ban list.
        pub fn is_mutation(&self) -> bool {
            matches!(self, Self::Ban { .. } | Self::Unban { .. })
        }
    }

    #[derive(Debug)]
    struct MockGuild {
        name: String,
        bans: BTreeMap<UserId, Option<String>>,
        bot_can_ban: bool,
        members: HashMap<UserId, MemberPermissions>,
        rejections: HashMap<UserId, u16>,
    }

    #[derive(Debug, Default)]
    struct MockState {
        guilds: HashMap<GuildId, MockGuild>,
        calls: Vec<(Instant, PlatformCall)>,
        messages: Vec<(ChannelId, String)>,
    }

    /// A mock platform holding guilds, bans and members in memory.
    #[derive(Debug, Default)]
    pub struct MockPlatform {
        state: Mutex<MockState>,
    }

    fn rejection(status: u16) -> SyncError {
        match status {
            401 => SyncError::Auth("401: Unauthorized".into()),
            403 => SyncError::Forbidden("Missing Permissions".into()),
            404 => SyncError::NotFound("Unknown Ban".into()),
            429 => SyncError::RateLimited {
                retry_after_ms: 1_000,
            },
            _ => SyncError::Http {
                status,
                message: "mock rejection".into(),
            },
        }
    }

    impl MockPlatform {
        /// Creates an empty mock.
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, MockState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn record(&self, call: PlatformCall) {
            self.state().calls.push((Instant::now(), call));
        }

        /// Adds a guild in which we hold ban rights.
        pub fn add_guild(&self, guild: GuildId, name: impl Into<String>) {
            self.state().guilds.insert(
                guild,
                MockGuild {
                    name: name.into(),
                    bans: BTreeMap::new(),
                    bot_can_ban: true,
                    members: HashMap::new(),
                    rejections: HashMap::new(),
                },
            );
        }

        /// Removes a guild, as if we had been kicked from it.
        pub fn remove_guild(&self, guild: GuildId) {
            self.state().guilds.remove(&guild);
        }

        /// Grants or revokes our ban rights in a guild.
        pub fn set_bot_can_ban(&self, guild: GuildId, can_ban: bool) {
            if let Some(g) = self.state().guilds.get_mut(&guild) {
                g.bot_can_ban = can_ban;
            }
        }

        /// Seeds a ban without recording a call.
        pub fn add_ban(&self, guild: GuildId, user: UserId, reason: Option<&str>) {
            if let Some(g) = self.state().guilds.get_mut(&guild) {
                g.bans.insert(user, reason.map(str::to_string));
            }
        }

        /// Adds a member with the given permissions.
        pub fn set_member(&self, guild: GuildId, user: UserId, perms: MemberPermissions) {
            if let Some(g) = self.state().guilds.get_mut(&guild) {
                g.members.insert(user, perms);
            }
        }

        /// Makes ban/unban calls for `user` in `guild` fail with `status`.
        pub fn reject(&self, guild: GuildId, user: UserId, status: u16) {
            if let Some(g) = self.state().guilds.get_mut(&guild) {
                g.rejections.insert(user, status);
            }
        }

        /// Current set of banned users in a guild.
        pub fn banned_users(&self, guild: GuildId) -> BTreeSet<UserId> {
            self.state()
                .guilds
                .get(&guild)
                .map(|g| g.bans.keys().copied().collect())
                .unwrap_or_default()
        }

        /// Reason stored for a ban.
        pub fn ban_reason(&self, guild: GuildId, user: UserId) -> Option<String> {
            self.state()
                .guilds
                .get(&guild)
                .and_then(|g| g.bans.get(&user).cloned().flatten())
        }

        /// All recorded calls, in order.
        pub fn calls(&self) -> Vec<PlatformCall> {
            self.state().calls.iter().map(|(_, c)| c.clone()).collect()
        }

        /// Recorded ban/unban calls with the instant they were made.
        pub fn timed_mutations(&self) -> Vec<(Instant, PlatformCall)> {
            self.state()
                .calls
                .iter()
                .filter(|(_, c)| c.is_mutation())
                .cloned()
                .collect()
        }

        /// Recorded ban/unban calls, in order.
        pub fn mutations(&self) -> Vec<PlatformCall> {
            self.calls().into_iter().filter(PlatformCall::is_mutation).collect()
        }

        /// Forgets recorded calls and messages.
        pub fn clear_calls(&self) {
            let mut state = self.state();
            state.calls.clear();
            state.messages.clear();
        }

        /// All sent messages, in order.
        pub fn messages(&self) -> Vec<(ChannelId, String)> {
            self.state().messages.clone()
        }

        /// Messages sent to one channel, in order.
        pub fn messages_to(&self, channel: ChannelId) -> Vec<String> {
            self.state()
                .messages
                .iter()
                .filter(|(c, _)| *c == channel)
                .map(|(_, m)| m.clone())
                .collect()
        }
    }

    #[async_trait]
    impl GuildPlatform for MockPlatform {
        fn platform_name(&self) -> &'static str {
            "mock"
        }

        async fn guild_name(&self, guild: GuildId) -> SyncResult<Option<String>> {
            Ok(self.state().guilds.get(&guild).map(|g| g.name.clone()))
        }

        async fn bans(&self, guild: GuildId) -> SyncResult<Vec<BanEntry>> {
            self.record(PlatformCall::Bans(guild));
            let state = self.state();
            let g = state.guilds.get(&guild).ok_or(SyncError::GuildNotFound(guild))?;
            Ok(g.bans
                .iter()
                .map(|(user, reason)| BanEntry::new(*user, reason.clone()))
                .collect())
        }

        async fn fetch_ban(&self, guild: GuildId, user: UserId) -> SyncResult<Option<BanEntry>> {
            self.record(PlatformCall::FetchBan(guild, user));
            let state = self.state();
            let g = state.guilds.get(&guild).ok_or(SyncError::GuildNotFound(guild))?;
            Ok(g.bans.get(&user).map(|reason| BanEntry::new(user, reason.clone())))
        }

        async fn ban(
            &self,
            guild: GuildId,
            user: UserId,
            reason: &str,
            delete_message_days: u8,
        ) -> SyncResult<()> {
            self.record(PlatformCall::Ban {
                guild,
                user,
                reason: reason.to_string(),
                delete_message_days,
            });
            let mut state = self.state();
            let g = state
                .guilds
                .get_mut(&guild)
                .ok_or(SyncError::GuildNotFound(guild))?;
            if !g.bot_can_ban {
                return Err(rejection(403));
            }
            if let Some(status) = g.rejections.get(&user) {
                return Err(rejection(*status));
            }
            g.bans.insert(user, Some(reason.to_string()));
            Ok(())
        }

        async fn unban(&self, guild: GuildId, user: UserId, reason: &str) -> SyncResult<()> {
            self.record(PlatformCall::Unban {
                guild,
                user,
                reason: reason.to_string(),
            });
            let mut state = self.state();
            let g = state
                .guilds
                .get_mut(&guild)
                .ok_or(SyncError::GuildNotFound(guild))?;
            if !g.bot_can_ban {
                return Err(rejection(403));
            }
            if let Some(status) = g.rejections.get(&user) {
                return Err(rejection(*status));
            }
            match g.bans.remove(&user) {
                Some(_) => Ok(()),
                None => Err(rejection(404)),
            }
        }

        async fn member_permissions(
            &self,
            guild: GuildId,
            user: UserId,
        ) -> SyncResult<Option<MemberPermissions>> {
            Ok(self
                .state()
                .guilds
                .get(&guild)
                .and_then(|g| g.members.get(&user).copied()))
        }

        async fn bot_can_ban(&self, guild: GuildId) -> SyncResult<bool> {
            self.record(PlatformCall::BotCanBan(guild));
            self.state()
                .guilds
                .get(&guild)
                .map(|g| g.bot_can_ban)
                .ok_or(SyncError::GuildNotFound(guild))
        }

        async fn send_message(&self, channel: ChannelId, content: &str) -> SyncResult<()> {
            self.state().messages.push((channel, content.to_string()));
            Ok(())
        }
    }
}
