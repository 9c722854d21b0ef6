//! Discord REST platform implementation.
//!
//! Uses the Discord HTTP API v10 for ban list access, permission lookups and
//! message delivery. Gateway events are not handled here; the host feeds
//! them to the propagation worker.

use crate::config::DiscordConfig;
use crate::error::{SyncError, SyncResult};
use crate::platform::{GuildPlatform, MemberPermissions};
use async_trait::async_trait;
use bansync_types::{BanEntry, ChannelId, GuildId, RoleId, UserId};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Page size for ban list requests (API maximum).
const BANS_PAGE_SIZE: usize = 1000;

/// Audit log reasons are capped at 512 characters.
const MAX_REASON_CHARS: usize = 512;

/// Messages are capped at 2000 characters.
const MAX_MESSAGE_CHARS: usize = 2000;

const ADMINISTRATOR: u64 = 1 << 3;
const BAN_MEMBERS: u64 = 1 << 2;

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiBan {
    reason: Option<String>,
    user: ApiUser,
}

#[derive(Debug, Deserialize)]
struct ApiRole {
    id: String,
    permissions: String,
}

#[derive(Debug, Deserialize)]
struct ApiGuild {
    id: String,
    name: String,
    owner_id: String,
    #[serde(default)]
    roles: Vec<ApiRole>,
}

#[derive(Debug, Deserialize)]
struct ApiMember {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    message: Option<String>,
    retry_after: Option<f64>,
}

/// Discord REST implementation of [`GuildPlatform`].
pub struct DiscordPlatform {
    config: DiscordConfig,
    client: Client,
    bot_user: RwLock<Option<UserId>>,
}

impl DiscordPlatform {
    /// Creates a new Discord platform client.
    pub fn new(config: DiscordConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("DiscordBot (bansync, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            bot_user: RwLock::new(None),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.config.api_base_url, path))
            .header("Authorization", format!("Bot {}", self.config.token))
    }

    async fn send(&self, request: RequestBuilder) -> SyncResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;
        check_status(response).await
    }

    /// GETs and decodes a JSON body; a 404 becomes `None`.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> SyncResult<Option<T>> {
        match self.send(self.request(Method::GET, path)).await {
            Ok(response) => {
                let body = response
                    .json()
                    .await
                    .map_err(|e| SyncError::Network(format!("failed to parse {path}: {e}")))?;
                Ok(Some(body))
            }
            Err(SyncError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Our own user id, fetched once.
    async fn current_user(&self) -> SyncResult<UserId> {
        if let Some(id) = *self.bot_user.read().await {
            return Ok(id);
        }
        let me: ApiUser = self
            .get_optional("/users/@me")
            .await?
            .ok_or_else(|| SyncError::Auth("current user not found".to_string()))?;
        let id = parse_user(&me.id)?;
        *self.bot_user.write().await = Some(id);
        Ok(id)
    }

    /// A guild we cannot see (404, or 403 for guilds we are not in) is `None`.
    async fn guild(&self, guild: GuildId) -> SyncResult<Option<ApiGuild>> {
        match self.get_optional(&format!("/guilds/{guild}")).await {
            Err(SyncError::Forbidden(_)) => Ok(None),
            other => other,
        }
    }
}

async fn check_status(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: ApiError = serde_json::from_str(&text).unwrap_or_default();
    let message = body.message.unwrap_or(text);

    Err(match status {
        StatusCode::UNAUTHORIZED => SyncError::Auth(message),
        StatusCode::FORBIDDEN => SyncError::Forbidden(message),
        StatusCode::NOT_FOUND => SyncError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => SyncError::RateLimited {
            retry_after_ms: body
                .retry_after
                .map(|secs| (secs * 1000.0).ceil() as u64)
                .unwrap_or(0),
        },
        _ => SyncError::Http {
            status: status.as_u16(),
            message,
        },
    })
}

fn parse_user(raw: &str) -> SyncResult<UserId> {
    UserId::parse(raw).map_err(|e| SyncError::Network(format!("malformed user id: {e}")))
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Effective ban-sync permissions of a member, from the guild's role table.
fn compute_permissions(
    guild: &ApiGuild,
    member: &ApiMember,
    user: UserId,
    admin_roles: &[RoleId],
) -> MemberPermissions {
    if guild.owner_id == user.to_string() {
        return MemberPermissions::ADMIN;
    }

    let bits = guild
        .roles
        .iter()
        .filter(|role| role.id == guild.id || member.roles.contains(&role.id))
        .filter_map(|role| role.permissions.parse::<u64>().ok())
        .fold(0, |acc, p| acc | p);

    let administrator = bits & ADMINISTRATOR != 0;
    let admin_role = member.roles.iter().any(|id| {
        RoleId::parse(id).is_ok_and(|role| admin_roles.contains(&role))
    });

    MemberPermissions {
        is_admin: administrator || admin_role,
        ban_members: administrator || bits & BAN_MEMBERS != 0,
    }
}

#[async_trait]
impl GuildPlatform for DiscordPlatform {
    fn platform_name(&self) -> &'static str {
        "Discord"
    }

    async fn guild_name(&self, guild: GuildId) -> SyncResult<Option<String>> {
        Ok(self.guild(guild).await?.map(|g| g.name))
    }

    async fn bans(&self, guild: GuildId) -> SyncResult<Vec<BanEntry>> {
        let mut all = Vec::new();
        let mut after: Option<UserId> = None;

        loop {
            let mut request = self
                .request(Method::GET, &format!("/guilds/{guild}/bans"))
                .query(&[("limit", BANS_PAGE_SIZE.to_string())]);
            if let Some(after) = after {
                request = request.query(&[("after", after.to_string())]);
            }

            let page: Vec<ApiBan> = self
                .send(request)
                .await?
                .json()
                .await
                .map_err(|e| SyncError::Network(format!("failed to parse ban list: {e}")))?;
            let full_page = page.len() >= BANS_PAGE_SIZE;

            for ban in page {
                let user = parse_user(&ban.user.id)?;
                after = Some(user);
                all.push(BanEntry::new(user, ban.reason));
            }

            if !full_page {
                break;
            }
        }

        debug!("Fetched {} bans for {}", all.len(), guild);
        Ok(all)
    }

    async fn fetch_ban(&self, guild: GuildId, user: UserId) -> SyncResult<Option<BanEntry>> {
        let ban: Option<ApiBan> = self.get_optional(&format!("/guilds/{guild}/bans/{user}")).await?;
        Ok(ban.map(|b| BanEntry::new(user, b.reason)))
    }

    async fn ban(
        &self,
        guild: GuildId,
        user: UserId,
        reason: &str,
        delete_message_days: u8,
    ) -> SyncResult<()> {
        let body = serde_json::json!({
            "delete_message_seconds": u32::from(delete_message_days) * 86_400,
        });
        self.send(
            self.request(Method::PUT, &format!("/guilds/{guild}/bans/{user}"))
                .header(
                    "X-Audit-Log-Reason",
                    urlencoding::encode(truncate(reason, MAX_REASON_CHARS)).into_owned(),
                )
                .json(&body),
        )
        .await?;
        debug!("Banned {} in {}", user, guild);
        Ok(())
    }

    async fn unban(&self, guild: GuildId, user: UserId, reason: &str) -> SyncResult<()> {
        self.send(
            self.request(Method::DELETE, &format!("/guilds/{guild}/bans/{user}"))
                .header(
                    "X-Audit-Log-Reason",
                    urlencoding::encode(truncate(reason, MAX_REASON_CHARS)).into_owned(),
                ),
        )
        .await?;
        debug!("Unbanned {} in {}", user, guild);
        Ok(())
    }

    async fn member_permissions(
        &self,
        guild: GuildId,
        user: UserId,
    ) -> SyncResult<Option<MemberPermissions>> {
        let Some(api_guild) = self.guild(guild).await? else {
            return Ok(None);
        };
        let member: Option<ApiMember> = self
            .get_optional(&format!("/guilds/{guild}/members/{user}"))
            .await?;
        Ok(member.map(|m| compute_permissions(&api_guild, &m, user, &self.config.admin_role_ids)))
    }

    async fn bot_can_ban(&self, guild: GuildId) -> SyncResult<bool> {
        let me = self.current_user().await?;
        self.member_permissions(guild, me)
            .await?
            .map(|p| p.ban_members)
            .ok_or(SyncError::GuildNotFound(guild))
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> SyncResult<()> {
        let body = serde_json::json!({ "content": truncate(content, MAX_MESSAGE_CHARS) });
        self.send(
            self.request(Method::POST, &format!("/channels/{channel}/messages"))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}
