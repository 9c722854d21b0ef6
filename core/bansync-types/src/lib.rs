//! Core type definitions for bansync.
//!
//! This crate defines the platform-agnostic types shared by the sync core
//! and the relay service:
//! - Snowflake identifiers for guilds, users, channels and roles
//! - Ban entries and live ban/unban event records
//! - The closed set of reconciliation operations

mod ban;
mod ids;
mod operation;

pub use ban::{BanEntry, BanEvent, BanEventKind};
pub use ids::{ChannelId, GuildId, RoleId, UserId};
pub use operation::Operation;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid snowflake id: {0:?}")]
    InvalidId(String),

    #[error("unknown operation: {0:?}")]
    InvalidOperation(String),
}
