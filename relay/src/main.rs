//! Ban sync relay
//!
//! Runs next to the chat gateway and exposes the ban sync core over HTTP:
//! 1. Live ban/unban events are queued and replicated to push peers
//! 2. Admin commands are executed and their replies returned
//!
//! Usage:
//!   DISCORD_TOKEN=... bansync-relay --config bansync.json --http-port 4002

use std::{fs, path::PathBuf, sync::Arc};
use anyhow::{Context, Result};
use bansync_relay::{build_router, AppState};
use bansync_sync::{
    BanSyncConfig, BanSyncService, DiscordConfig, DiscordPlatform, GuildPlatform, PolicyStore,
    Propagator,
};
use bansync_types::ChannelId;
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "bansync-relay")]
#[command(about = "Cross-server ban synchronization relay")]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the policy database
    #[arg(short, long, default_value = "bansync.db")]
    database: PathBuf,

    /// Channel that receives propagation notifications
    #[arg(long)]
    ops_log_channel: Option<u64>,

    /// HTTP API port
    #[arg(long, default_value = "4002")]
    http_port: u16,

    /// Bot token
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    sync: BanSyncConfig,
    discord: DiscordConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    info!("Loading config from {:?}", path);
    let raw = fs::read_to_string(path).context("Failed to read config file")?;
    serde_json::from_str(&raw).context("Failed to parse config file")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("Ban sync relay starting...");
    let FileConfig {
        sync: mut config,
        discord: mut discord,
    } = load_config(args.config.as_ref())?;

    if let Some(token) = args.token {
        discord.token = token;
    }
    if let Some(channel) = args.ops_log_channel {
        config.ops_log_channel = ChannelId::new(channel);
    }
    if discord.token.is_empty() {
        anyhow::bail!("No bot token: set DISCORD_TOKEN or `discord.token` in the config file");
    }
    if config.ops_log_channel.get() == 0 {
        warn!("No operations log channel configured; notifications will fail");
    }

    let platform = Arc::new(DiscordPlatform::new(discord)?);
    let database = args
        .database
        .to_str()
        .context("Database path is not valid UTF-8")?;
    let store = PolicyStore::new(database).context("Failed to open policy database")?;
    info!("Policy database: {}", database);

    let (events, worker) =
        Propagator::new(platform.clone(), store.clone(), &config).spawn(config.queue_capacity);
    let service = BanSyncService::new(platform.clone(), store, &config);
    let state = Arc::new(AppState::new(service, events, platform.platform_name()));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.http_port))
        .await
        .context("Failed to bind HTTP port")?;

    println!("\n========================================");
    println!("  Ban Sync Relay Running");
    println!("========================================");
    println!("  Platform:  {}", platform.platform_name());
    println!("  HTTP Port: {}", args.http_port);
    println!("  Ops log:   {}", config.ops_log_channel);
    println!("  Pacing:    {} ms", config.pacing_ms);
    println!("========================================\n");

    info!("HTTP API listening on port {}", args.http_port);
    axum::serve(listener, build_router(state))
        .await
        .context("HTTP server failed")?;

    worker.abort();
    Ok(())
}
