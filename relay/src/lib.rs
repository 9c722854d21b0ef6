//! HTTP API for the ban sync relay.
//!
//! The chat gateway bridge forwards ban/unban events and admin commands
//! here; events go onto the propagation queue and commands run through
//! [`BanSyncService`].

use std::sync::Arc;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bansync_sync::{BanSyncService, Command, CommandContext, PropagatorHandle, SyncError};
use bansync_types::{BanEvent, ChannelId, GuildId, UserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Shared state behind the router.
pub struct AppState {
    service: BanSyncService,
    events: PropagatorHandle,
    platform_name: &'static str,
}

impl AppState {
    pub fn new(service: BanSyncService, events: PropagatorHandle, platform_name: &'static str) -> Self {
        Self {
            service,
            events,
            platform_name,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub platform: String,
    pub version: String,
}

/// A ban or unban observed by the gateway.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BanEventRequest {
    pub guild: GuildId,
    pub user: UserId,
    #[serde(default)]
    pub reason: Option<String>,
}

/// An admin command typed in a guild channel.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CommandRequest {
    pub guild: GuildId,
    pub channel: ChannelId,
    pub author: UserId,
    pub author_name: String,
    /// The command line without prefix, e.g. `pull 1234`.
    pub command: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CommandResponse {
    pub replies: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps sync errors onto HTTP statuses.
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SyncError::InvalidCommand(_) => StatusCode::BAD_REQUEST,
            SyncError::QueueFull(_) | SyncError::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,
            e if e.is_remote_rejection() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        platform: state.platform_name.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn ban_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BanEventRequest>,
) -> Result<StatusCode, ApiError> {
    debug!("Ban of {} in {}", req.user, req.guild);
    state
        .events
        .try_submit(BanEvent::created(req.guild, req.user, req.reason))?;
    Ok(StatusCode::ACCEPTED)
}

async fn unban_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BanEventRequest>,
) -> Result<StatusCode, ApiError> {
    debug!("Unban of {} in {}", req.user, req.guild);
    state.events.try_submit(BanEvent::lifted(req.guild, req.user))?;
    Ok(StatusCode::ACCEPTED)
}

async fn command_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command: Command = req.command.parse()?;
    let ctx = CommandContext {
        guild: req.guild,
        channel: req.channel,
        author: req.author,
        author_name: req.author_name,
    };
    let replies = state.service.execute(&ctx, command).await?;
    Ok(Json(CommandResponse { replies }))
}

/// Build the HTTP API router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/events/ban", post(ban_handler))
        .route("/api/v1/events/unban", post(unban_handler))
        .route("/api/v1/commands", post(command_handler))
        .with_state(state)
}
