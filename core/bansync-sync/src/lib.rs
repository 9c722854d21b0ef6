//! Cross-guild ban synchronization.
//!
//! Keeps ban lists consistent across a group of Discord guilds that have
//! opted into trusting each other.
//!
//! # Architecture
//!
//! Every guild keeps two peer lists: the guilds it accepts bans *from*
//! (pull list) and the guilds it sends bans *to* (push list). Two flows use
//! them:
//!
//! - **Reconcile**: an admin runs `pull`, `push` or `sync` against one peer.
//!   The engine diffs the two ban lists and bans the missing users on the
//!   receiving side, counting per-user outcomes.
//! - **Propagate**: when a member is banned or unbanned, the event is queued
//!   and a single worker replicates it to every guild on the origin's push
//!   list, reporting each delivery to the operations log channel.
//!
//! ## Components
//!
//! - **Platform**: abstracts the chat platform ([`GuildPlatform`])
//! - **Policy store**: SQLite-backed peer lists
//! - **Policy**: decides whether an actor may run an operation
//! - **Engine**: one-shot reconciliation between two guilds
//! - **Propagation**: queued event replication with pacing
//! - **Commands**: the admin command surface and its replies
//!
//! # Example
//!
//! ```
//! use bansync_sync::{BanSyncConfig, PolicyStore, Propagator};
//! use bansync_sync::platform::mock::MockPlatform;
//! use bansync_types::ChannelId;
//! use std::sync::Arc;
//!
//! let platform = Arc::new(MockPlatform::new());
//! let store = PolicyStore::open_in_memory().unwrap();
//! let config = BanSyncConfig::new(ChannelId::new(1));
//!
//! let propagator = Propagator::new(platform, store, &config);
//! ```

pub mod commands;
mod config;
pub mod discord;
mod engine;
mod error;
pub mod notify;
pub mod platform;
pub mod policy;
pub mod policy_store;
pub mod propagation;
mod stats;

pub use commands::{BanSyncService, Command, CommandContext};
pub use config::{BanSyncConfig, DiscordConfig, DEFAULT_PACING_MS};
pub use discord::DiscordPlatform;
pub use engine::ReconcileEngine;
pub use error::{SyncError, SyncResult};
pub use notify::{Notification, OpsLog, Severity};
pub use platform::{GuildPlatform, MemberPermissions};
pub use policy::{Actor, AuthorizationPolicy};
pub use policy_store::{PeerList, PolicyStore};
pub use propagation::{Delivery, PeerDelivery, Propagator, PropagatorHandle};
pub use stats::{OperationStats, Outcome};
