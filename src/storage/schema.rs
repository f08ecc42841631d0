//! Table definitions for the persistence gateway.
//!
//! Three tables: per-item enchantment grants, per-player ability records
//! and the usage counters the statistics surface reads. The UNIQUE
//! constraints are what the upsert statements in the gateway lean on.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS player_enchantments (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  player_uuid TEXT NOT NULL,
  item_uuid TEXT NOT NULL,
  enchantment_id TEXT NOT NULL,
  enchantment_level INTEGER NOT NULL,
  applied_at INTEGER NOT NULL,
  UNIQUE(player_uuid, item_uuid, enchantment_id)
);

CREATE TABLE IF NOT EXISTS player_abilities (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  player_uuid TEXT NOT NULL,
  ability_id TEXT NOT NULL,
  unlocked_at INTEGER NOT NULL,
  uses INTEGER NOT NULL DEFAULT 0,
  UNIQUE(player_uuid, ability_id)
);

CREATE TABLE IF NOT EXISTS enchantment_statistics (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  enchantment_id TEXT NOT NULL UNIQUE,
  total_applications INTEGER NOT NULL DEFAULT 0,
  total_removals INTEGER NOT NULL DEFAULT 0,
  total_uses INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_player_enchantments_item
  ON player_enchantments (player_uuid, item_uuid);

CREATE INDEX IF NOT EXISTS idx_player_abilities_player
  ON player_abilities (player_uuid);
"#;
