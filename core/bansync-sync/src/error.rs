//! Error types for the sync layer.

use bansync_types::GuildId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// We lack the ban members permission in a guild. Aborts an operation
    /// before anything is mutated.
    #[error(":stop_sign: I do not have ban members permissions in the target server ({guild}).")]
    MissingBanPermission { guild: GuildId },

    /// The platform refused the request (HTTP 403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The platform rate limited the request (HTTP 429).
    #[error("rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other non-success HTTP response.
    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },

    /// The requested object does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A guild id did not resolve to a guild we can see.
    #[error("guild not found: {0}")]
    GuildNotFound(GuildId),

    /// A command could not be parsed.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A bounded queue is full.
    #[error("queue full: {0}")]
    QueueFull(String),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// Whether this error is a rejection of a single remote call. Such errors
    /// are counted per entry instead of aborting a reconciliation.
    pub fn is_remote_rejection(&self) -> bool {
        matches!(
            self,
            Self::Forbidden(_)
                | Self::RateLimited { .. }
                | Self::Http { .. }
                | Self::NotFound(_)
                | Self::Network(_)
        )
    }

    /// HTTP status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::RateLimited { .. } => Some(429),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<bansync_types::Error> for SyncError {
    fn from(e: bansync_types::Error) -> Self {
        Self::InvalidCommand(e.to_string())
    }
}
