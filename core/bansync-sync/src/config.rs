//! Runtime configuration for the sync core.

use bansync_types::{ChannelId, RoleId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default pause between two peer deliveries of the same live event.
pub const DEFAULT_PACING_MS: u64 = 3_000;

/// Configuration for reconciliation and live propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BanSyncConfig {
    /// Channel that receives propagation notifications.
    pub ops_log_channel: ChannelId,
    /// Pause between successive peer deliveries (ms).
    pub pacing_ms: u64,
    /// Days of message history to purge when banning.
    pub delete_message_days: u8,
    /// Capacity of the live event queue.
    pub queue_capacity: usize,
}

impl BanSyncConfig {
    /// Creates a config that logs to the given channel, other fields default.
    pub fn new(ops_log_channel: ChannelId) -> Self {
        Self {
            ops_log_channel,
            ..Default::default()
        }
    }

    /// Pacing delay as a `Duration`.
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

impl Default for BanSyncConfig {
    fn default() -> Self {
        Self {
            ops_log_channel: ChannelId::new(0),
            pacing_ms: DEFAULT_PACING_MS,
            delete_message_days: 0,
            queue_capacity: 64,
        }
    }
}

/// Discord REST API configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token, sent as `Authorization: Bot <token>`.
    pub token: String,
    /// Base URL of the REST API (e.g. `https://discord.com/api/v10`).
    pub api_base_url: String,
    /// Roles whose holders count as bot-level administrators.
    pub admin_role_ids: Vec<RoleId>,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base_url: "https://discord.com/api/v10".to_string(),
            admin_role_ids: Vec::new(),
            timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("admin_role_ids", &self.admin_role_ids)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
