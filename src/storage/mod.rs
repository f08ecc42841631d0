//! # Storage Module - Persistence Gateway
//!
//! One async API over two interchangeable SQL backends (see [`runner`]):
//! an embedded single-connection profile serialized through a worker
//! thread, and a bounded WAL-mode connection pool for shared deployments.
//!
//! The gateway is dumb plumbing: it owns the SQL text and the row mapping,
//! never business rules. Callers decide whether to await durability or
//! fire-and-log; nothing here retries and nothing here mutates in-memory
//! engine state.
//!
//! ## Tables
//!
//! - `player_enchantments` - one row per (player, item, enchantment) grant
//! - `player_abilities` - unlock timestamp and use counter per ability
//! - `enchantment_statistics` - lifetime apply/remove/trigger counters

pub mod runner;
pub mod schema;

use chrono::{DateTime, TimeZone, Utc};
use log::info;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{DatabaseBackend, DatabaseConfig};
use runner::{EmbeddedWorker, Pool, RunnerError, SqlRunner};

pub use runner::PoolOptions;

/// Errors surfaced by gateway operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend is gone: shut down, out of connections, or never came up.
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A mutation reached the backend and failed there.
    #[error("storage write failed: {0}")]
    WriteFailed(#[source] rusqlite::Error),

    /// A query reached the backend and failed there.
    #[error("storage read failed: {0}")]
    ReadFailed(#[source] rusqlite::Error),
}

/// Which statistics column an increment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticKind {
    Applications,
    Removals,
    Triggers,
}

impl StatisticKind {
    fn column(&self) -> &'static str {
        match self {
            StatisticKind::Applications => "total_applications",
            StatisticKind::Removals => "total_removals",
            StatisticKind::Triggers => "total_uses",
        }
    }
}

/// Lifetime counters for one enchantment id. Absent rows read as zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnchantmentStats {
    pub applications: u64,
    pub removals: u64,
    pub triggers: u64,
}

/// One row of a player's ability history.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerAbilityRecord {
    pub ability_id: String,
    pub unlocked_at: DateTime<Utc>,
    pub uses: u64,
}

/// Async facade over the configured SQL backend.
pub struct PersistenceGateway {
    runner: SqlRunner,
}

impl PersistenceGateway {
    /// Bring up the backend named in the config. Fails hard; a gateway that
    /// cannot reach its database should stop startup, not limp.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let gateway = match config.backend {
            DatabaseBackend::Embedded => Self::embedded(Path::new(&config.path))?,
            DatabaseBackend::Pooled => Self::pooled(
                Path::new(&config.path),
                PoolOptions {
                    max_size: config.max_pool_size as usize,
                    min_idle: config.min_idle as usize,
                    connection_timeout: Duration::from_millis(config.connection_timeout_ms),
                    idle_timeout: Duration::from_millis(config.idle_timeout_ms),
                    max_lifetime: Duration::from_millis(config.max_lifetime_ms),
                },
            )?,
        };
        info!("persistence gateway up ({})", gateway.runner.backend_name());
        Ok(gateway)
    }

    /// Single-connection backend behind a worker thread.
    pub fn embedded(path: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            runner: SqlRunner::Embedded(EmbeddedWorker::start(path)?),
        })
    }

    /// Bounded connection pool backend.
    pub fn pooled(path: &Path, options: PoolOptions) -> Result<Self, StorageError> {
        Ok(Self {
            runner: SqlRunner::Pooled(Pool::connect(path, options)?),
        })
    }

    /// Stop the backend. Queued embedded work drains first; idempotent.
    pub fn shutdown(&self) {
        self.runner.shutdown();
    }

    pub fn backend_name(&self) -> &'static str {
        self.runner.backend_name()
    }

    /// Upsert one grant. Re-applying overwrites level and timestamp.
    pub async fn save_enchantment(
        &self,
        player: Uuid,
        item: Uuid,
        enchantment_id: &str,
        level: u32,
    ) -> Result<(), StorageError> {
        let player = player.to_string();
        let item = item.to_string();
        let id = enchantment_id.to_string();
        let applied_at = Utc::now().timestamp();
        self.runner
            .run(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO player_enchantments \
                     (player_uuid, item_uuid, enchantment_id, enchantment_level, applied_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![player, item, id, level as i64, applied_at],
                )
                .map(|_| ())
            })
            .await
            .map_err(write_error)
    }

    /// Delete one grant. Deleting an absent row is not an error.
    pub async fn remove_enchantment(
        &self,
        player: Uuid,
        item: Uuid,
        enchantment_id: &str,
    ) -> Result<(), StorageError> {
        let player = player.to_string();
        let item = item.to_string();
        let id = enchantment_id.to_string();
        self.runner
            .run(move |conn| {
                conn.execute(
                    "DELETE FROM player_enchantments \
                     WHERE player_uuid = ?1 AND item_uuid = ?2 AND enchantment_id = ?3",
                    params![player, item, id],
                )
                .map(|_| ())
            })
            .await
            .map_err(write_error)
    }

    /// All grants on one item, id to level. Empty map when none.
    pub async fn load_enchantments(
        &self,
        player: Uuid,
        item: Uuid,
    ) -> Result<HashMap<String, u32>, StorageError> {
        let player = player.to_string();
        let item = item.to_string();
        self.runner
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT enchantment_id, enchantment_level FROM player_enchantments \
                     WHERE player_uuid = ?1 AND item_uuid = ?2",
                )?;
                let rows = stmt.query_map(params![player, item], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u32))
                })?;
                let mut out = HashMap::new();
                for row in rows {
                    let (id, level) = row?;
                    out.insert(id, level);
                }
                Ok(out)
            })
            .await
            .map_err(read_error)
    }

    /// Record one use of an ability. The first use creates the row with
    /// the unlock timestamp; later uses bump the counter atomically.
    pub async fn record_ability_use(
        &self,
        player: Uuid,
        ability_id: &str,
    ) -> Result<(), StorageError> {
        let player = player.to_string();
        let id = ability_id.to_string();
        let unlocked_at = Utc::now().timestamp();
        self.runner
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO player_abilities (player_uuid, ability_id, unlocked_at, uses) \
                     VALUES (?1, ?2, ?3, 1) \
                     ON CONFLICT(player_uuid, ability_id) DO UPDATE SET uses = uses + 1",
                    params![player, id, unlocked_at],
                )
                .map(|_| ())
            })
            .await
            .map_err(write_error)
    }

    /// A player's full ability history, ordered by id.
    pub async fn load_abilities(
        &self,
        player: Uuid,
    ) -> Result<Vec<PlayerAbilityRecord>, StorageError> {
        let player = player.to_string();
        self.runner
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT ability_id, unlocked_at, uses FROM player_abilities \
                     WHERE player_uuid = ?1 ORDER BY ability_id",
                )?;
                let rows = stmt.query_map(params![player], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)? as u64,
                    ))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    let (ability_id, ts, uses) = row?;
                    out.push(PlayerAbilityRecord {
                        ability_id,
                        unlocked_at: Utc
                            .timestamp_opt(ts, 0)
                            .single()
                            .unwrap_or_else(Utc::now),
                        uses,
                    });
                }
                Ok(out)
            })
            .await
            .map_err(read_error)
    }

    /// Bump one counter for an enchantment id. The increment happens in
    /// SQL, so concurrent bumps never lose updates.
    pub async fn increment_statistic(
        &self,
        enchantment_id: &str,
        kind: StatisticKind,
    ) -> Result<(), StorageError> {
        let id = enchantment_id.to_string();
        let column = kind.column();
        let sql = format!(
            "INSERT INTO enchantment_statistics (enchantment_id, {column}) VALUES (?1, 1) \
             ON CONFLICT(enchantment_id) DO UPDATE SET {column} = {column} + 1"
        );
        self.runner
            .run(move |conn| conn.execute(&sql, params![id]).map(|_| ()))
            .await
            .map_err(write_error)
    }

    /// Lifetime counters for one enchantment id, zeros when never touched.
    pub async fn read_statistics(
        &self,
        enchantment_id: &str,
    ) -> Result<EnchantmentStats, StorageError> {
        let id = enchantment_id.to_string();
        self.runner
            .run(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT total_applications, total_removals, total_uses \
                         FROM enchantment_statistics WHERE enchantment_id = ?1",
                        params![id],
                        |row| {
                            Ok(EnchantmentStats {
                                applications: row.get::<_, i64>(0)? as u64,
                                removals: row.get::<_, i64>(1)? as u64,
                                triggers: row.get::<_, i64>(2)? as u64,
                            })
                        },
                    )
                    .optional()?;
                Ok(row.unwrap_or_default())
            })
            .await
            .map_err(read_error)
    }
}

fn write_error(e: RunnerError) -> StorageError {
    match e {
        RunnerError::Sql(e) => StorageError::WriteFailed(e),
        other => StorageError::BackendUnavailable(other.to_string()),
    }
}

fn read_error(e: RunnerError) -> StorageError {
    match e {
        RunnerError::Sql(e) => StorageError::ReadFailed(e),
        other => StorageError::BackendUnavailable(other.to_string()),
    }
}
