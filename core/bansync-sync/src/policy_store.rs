//! Persistent storage for per-guild peer lists.
//!
//! Each guild owns two lists of peer guild ids: peers allowed to pull bans
//! from it, and peers it pushes bans to (which are also allowed to push into
//! it). Uses a separate SQLite file so policy data is isolated from anything
//! else the host persists.

use crate::error::{SyncError, SyncResult};
use bansync_types::GuildId;
use rusqlite::{params, Connection};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Which of a guild's two peer lists an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerList {
    /// Peers permitted to pull bans from this guild.
    AllowPullFrom,
    /// Peers this guild replicates bans to, and which may push into it.
    AllowPushTo,
}

impl PeerList {
    fn as_str(self) -> &'static str {
        match self {
            Self::AllowPullFrom => "allow_pull_from",
            Self::AllowPushTo => "allow_push_to",
        }
    }
}

impl fmt::Display for PeerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent store for peer lists backed by SQLite.
#[derive(Clone)]
pub struct PolicyStore {
    conn: Arc<Mutex<Connection>>,
}

impl PolicyStore {
    /// Opens (or creates) a policy store at the given path.
    pub fn new(path: &str) -> SyncResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SyncError::Storage(format!("failed to open policy store: {e}")))?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory policy store (for testing).
    pub fn open_in_memory() -> SyncResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            SyncError::Storage(format!("failed to open in-memory policy store: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> SyncResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> SyncResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Storage("policy store lock poisoned".to_string()))
    }

    fn init_schema(&self) -> SyncResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS peer_lists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id INTEGER NOT NULL,
                list TEXT NOT NULL,
                peer_id INTEGER NOT NULL,
                UNIQUE(guild_id, list, peer_id)
            );
            ",
        )
        .map_err(|e| SyncError::Storage(format!("failed to init policy schema: {e}")))?;
        Ok(())
    }

    /// Adds a peer to a guild's list. Adding a present peer is a no-op.
    /// Returns whether the list changed.
    pub fn add(&self, guild: GuildId, list: PeerList, peer: GuildId) -> SyncResult<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO peer_lists (guild_id, list, peer_id) VALUES (?1, ?2, ?3)",
                params![to_sql(guild), list.as_str(), to_sql(peer)],
            )
            .map_err(|e| SyncError::Storage(format!("failed to add peer: {e}")))?;
        debug!("{} {}: add {} (changed: {})", guild, list, peer, changed > 0);
        Ok(changed > 0)
    }

    /// Removes a peer from a guild's list. Removing an absent peer is a
    /// no-op. Returns whether the list changed.
    pub fn remove(&self, guild: GuildId, list: PeerList, peer: GuildId) -> SyncResult<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "DELETE FROM peer_lists WHERE guild_id = ?1 AND list = ?2 AND peer_id = ?3",
                params![to_sql(guild), list.as_str(), to_sql(peer)],
            )
            .map_err(|e| SyncError::Storage(format!("failed to remove peer: {e}")))?;
        debug!("{} {}: remove {} (changed: {})", guild, list, peer, changed > 0);
        Ok(changed > 0)
    }

    /// Empties a guild's list.
    pub fn clear(&self, guild: GuildId, list: PeerList) -> SyncResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM peer_lists WHERE guild_id = ?1 AND list = ?2",
            params![to_sql(guild), list.as_str()],
        )
        .map_err(|e| SyncError::Storage(format!("failed to clear peer list: {e}")))?;
        debug!("{} {}: cleared", guild, list);
        Ok(())
    }

    /// Lists a guild's peers in insertion order. Unknown guilds have empty lists.
    pub fn list(&self, guild: GuildId, list: PeerList) -> SyncResult<Vec<GuildId>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT peer_id FROM peer_lists WHERE guild_id = ?1 AND list = ?2 ORDER BY id")
            .map_err(|e| SyncError::Storage(format!("failed to prepare peer query: {e}")))?;
        let rows = stmt
            .query_map(params![to_sql(guild), list.as_str()], |row| row.get::<_, i64>(0))
            .map_err(|e| SyncError::Storage(format!("failed to query peers: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| SyncError::Storage(format!("failed to read peer row: {e}")))?;
            result.push(from_sql(raw));
        }
        Ok(result)
    }

    /// Whether `peer` is on a guild's list.
    pub fn contains(&self, guild: GuildId, list: PeerList, peer: GuildId) -> SyncResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM peer_lists WHERE guild_id = ?1 AND list = ?2 AND peer_id = ?3",
                params![to_sql(guild), list.as_str(), to_sql(peer)],
                |row| row.get(0),
            )
            .map_err(|e| SyncError::Storage(format!("failed to check peer: {e}")))?;
        Ok(count > 0)
    }
}

// Snowflakes fit in 63 bits; the cast keeps the bit pattern either way.
fn to_sql(id: GuildId) -> i64 {
    id.get() as i64
}

fn from_sql(raw: i64) -> GuildId {
    GuildId::new(raw as u64)
}
