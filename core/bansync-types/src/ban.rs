//! Ban entries and live ban events.

use crate::{GuildId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single entry of a guild's ban list as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    /// The banned user.
    pub user: UserId,
    /// Free-text reason attached to the ban, if any.
    pub reason: Option<String>,
}

impl BanEntry {
    /// Creates a ban entry.
    pub fn new(user: UserId, reason: Option<String>) -> Self {
        Self { user, reason }
    }
}

/// Which kind of ban change a live event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanEventKind {
    /// A user was banned.
    Created,
    /// A ban was lifted.
    Lifted,
}

impl BanEventKind {
    /// Article + noun used in human-readable notifications ("A ban", "An unban").
    pub fn noun(self) -> &'static str {
        match self {
            Self::Created => "A ban",
            Self::Lifted => "An unban",
        }
    }
}

impl fmt::Display for BanEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "ban"),
            Self::Lifted => write!(f, "unban"),
        }
    }
}

/// An immutable record of a ban change observed in a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEvent {
    /// Whether the ban was created or lifted.
    pub kind: BanEventKind,
    /// The guild where the change happened.
    pub guild: GuildId,
    /// The affected user.
    pub user: UserId,
    /// The ban reason, when the platform delivered one with the event.
    #[serde(default)]
    pub reason: Option<String>,
}

impl BanEvent {
    /// A ban was created in `guild`.
    pub fn created(guild: GuildId, user: UserId, reason: Option<String>) -> Self {
        Self {
            kind: BanEventKind::Created,
            guild,
            user,
            reason,
        }
    }

    /// A ban was lifted in `guild`.
    pub fn lifted(guild: GuildId, user: UserId) -> Self {
        Self {
            kind: BanEventKind::Lifted,
            guild,
            user,
            reason: None,
        }
    }
}
