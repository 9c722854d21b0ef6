//! The closed set of reconciliation operations.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a reconciliation between the actor's guild (source) and a
/// target guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Adopt the target's bans into the source.
    Pull,
    /// Project the source's bans into the target.
    Push,
    /// Both directions, pull first.
    Sync,
}

impl Operation {
    /// Whether this operation bans into the source guild.
    pub fn pulls(self) -> bool {
        matches!(self, Self::Pull | Self::Sync)
    }

    /// Whether this operation bans into the target guild.
    pub fn pushes(self) -> bool {
        matches!(self, Self::Push | Self::Sync)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pull => write!(f, "pull"),
            Self::Push => write!(f, "push"),
            Self::Sync => write!(f, "sync"),
        }
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pull" => Ok(Self::Pull),
            "push" => Ok(Self::Push),
            "sync" => Ok(Self::Sync),
            _ => Err(Error::InvalidOperation(s.to_string())),
        }
    }
}
