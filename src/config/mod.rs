//! Configuration for the runeforge engine.
//!
//! Settings live in a TOML file and deserialize into typed sections. Every
//! field carries a serde default, so a minimal file (or none at all, via
//! [`Config::default`]) still yields a working configuration.
//!
//! ```toml
//! [definitions]
//! file = "definitions.json"
//!
//! [enchant]
//! max_per_item = 5
//! check_conflicts = true
//!
//! [database]
//! backend = "embedded"
//! path = "data/runeforge.db"
//!
//! [logging]
//! level = "info"
//! file = "runeforge.log"
//! ```
//!
//! The `pooled` backend reads the pool sizing fields; the `embedded`
//! backend ignores them.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub definitions: DefinitionsConfig,
    #[serde(default)]
    pub enchant: EnchantConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the definition pack lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionsConfig {
    #[serde(default = "default_definitions_file")]
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnchantConfig {
    /// Cap on distinct enchantments per item. Upgrading one that is
    /// already present is exempt.
    #[serde(default = "default_max_per_item")]
    pub max_per_item: u32,
    /// When false, conflicting enchantments may share an item.
    #[serde(default = "default_true")]
    pub check_conflicts: bool,
    /// Bonus factor hosts may price synergy pairs with.
    #[serde(default = "default_synergy_multiplier")]
    pub synergy_multiplier: f64,
    /// When false, apply/remove/trigger counters are not written.
    #[serde(default = "default_true")]
    pub track_statistics: bool,
}

/// Which SQL profile the persistence gateway runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseBackend {
    /// One connection on a dedicated worker thread.
    Embedded,
    /// A bounded pool of WAL-mode connections.
    Pooled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: DatabaseBackend,
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
    #[serde(default = "default_min_idle")]
    pub min_idle: u32,
    /// How long an acquire may wait for a free connection.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Idle connections beyond `min_idle` are closed after this long.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Connections are retired at checkout once older than this.
    #[serde(default = "default_max_lifetime_ms")]
    pub max_lifetime_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
}

fn default_definitions_file() -> String {
    "definitions.json".to_string()
}

fn default_max_per_item() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_synergy_multiplier() -> f64 {
    1.25
}

fn default_backend() -> DatabaseBackend {
    DatabaseBackend::Embedded
}

fn default_database_path() -> String {
    "data/runeforge.db".to_string()
}

fn default_max_pool_size() -> u32 {
    10
}

fn default_min_idle() -> u32 {
    2
}

fn default_connection_timeout_ms() -> u64 {
    30_000
}

fn default_idle_timeout_ms() -> u64 {
    600_000
}

fn default_max_lifetime_ms() -> u64 {
    1_800_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> Option<String> {
    Some("runeforge.log".to_string())
}

impl Default for DefinitionsConfig {
    fn default() -> Self {
        Self {
            file: default_definitions_file(),
        }
    }
}

impl Default for EnchantConfig {
    fn default() -> Self {
        Self {
            max_per_item: default_max_per_item(),
            check_conflicts: true,
            synergy_multiplier: default_synergy_multiplier(),
            track_statistics: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_database_path(),
            max_pool_size: default_max_pool_size(),
            min_idle: default_min_idle(),
            connection_timeout_ms: default_connection_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_lifetime_ms: default_max_lifetime_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}
