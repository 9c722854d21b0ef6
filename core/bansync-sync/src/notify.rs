//! Notifications sent to the operations log channel.

use crate::error::SyncError;
use crate::platform::GuildPlatform;
use bansync_types::{BanEventKind, ChannelId, UserId};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

const NOT_AUTHORIZED: &str =
    "NOT AUTHORIZED IN TARGET SERVER. PLEASE REVIEW BOT AUTHORIZATION IMMEDIATELY.";

/// How bad a propagation outcome is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// We cannot ban in the target at all.
    Fatal,
    /// The change was replicated.
    Success,
    /// A single delivery failed.
    Warning,
}

/// A propagation outcome for one peer guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub kind: BanEventKind,
    pub user: UserId,
    /// Display name of the guild the change came from.
    pub source: String,
    /// Display name of the peer guild.
    pub target: String,
    /// Ban reason on success, error code on warning.
    pub detail: Option<String>,
}

impl Notification {
    pub fn fatal(kind: BanEventKind, user: UserId, source: &str, target: &str) -> Self {
        Self {
            severity: Severity::Fatal,
            kind,
            user,
            source: source.to_string(),
            target: target.to_string(),
            detail: None,
        }
    }

    pub fn success(
        kind: BanEventKind,
        user: UserId,
        source: &str,
        target: &str,
        reason: Option<String>,
    ) -> Self {
        Self {
            severity: Severity::Success,
            kind,
            user,
            source: source.to_string(),
            target: target.to_string(),
            detail: reason,
        }
    }

    pub fn warning(
        kind: BanEventKind,
        user: UserId,
        source: &str,
        target: &str,
        error: &SyncError,
    ) -> Self {
        let code = error
            .status_code()
            .map_or_else(|| error.to_string(), |status| status.to_string());
        Self {
            severity: Severity::Warning,
            kind,
            user,
            source: source.to_string(),
            target: target.to_string(),
            detail: Some(code),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = self.kind.noun();
        let user = self.user;
        match self.severity {
            Severity::Fatal => write!(
                f,
                "[BAN SYNC]: :stop_sign: **FATAL**: {noun} on <@{user}> (`{user}`) has __FAILED__ \
                 to push from `{}` to `{}`. \n> Fatal Error: `{NOT_AUTHORIZED}`",
                self.source, self.target
            ),
            Severity::Success => {
                write!(
                    f,
                    "[BAN SYNC]: :white_check_mark: {noun} on <@{user}> (`{user}`) has been \
                     pushed from `{}` to `{}`.",
                    self.source, self.target
                )?;
                match (&self.kind, &self.detail) {
                    (BanEventKind::Created, Some(reason)) => write!(f, " \n> Details: `{reason}`"),
                    _ => Ok(()),
                }
            }
            Severity::Warning => write!(
                f,
                "[BAN SYNC]: :warning: **ALERT**: {noun} on <@{user}> (`{user}`) has __FAILED__ \
                 to push from `{}` to `{}`. \n> Exception: `{}`",
                self.source,
                self.target,
                self.detail.as_deref().unwrap_or("unknown")
            ),
        }
    }
}

/// Delivers notifications to the configured operations log channel.
#[derive(Clone)]
pub struct OpsLog {
    platform: Arc<dyn GuildPlatform>,
    channel: ChannelId,
}

impl OpsLog {
    pub fn new(platform: Arc<dyn GuildPlatform>, channel: ChannelId) -> Self {
        Self { platform, channel }
    }

    /// The channel notifications go to.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Sends a notification. Delivery failures are logged and swallowed.
    pub async fn notify(&self, notification: &Notification) {
        if let Err(e) = self
            .platform
            .send_message(self.channel, &notification.to_string())
            .await
        {
            warn!("Failed to send notification to {}: {}", self.channel, e);
        }
    }
}
