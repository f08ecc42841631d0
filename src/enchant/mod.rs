//! Enchantment application rules.
//!
//! [`ApplicationValidator`] owns the in-memory record of what sits on each
//! (player, item) pair and enforces the apply protocol in a fixed order:
//! the enchantment must exist, the level must be in range, the player must
//! be allowed the tier, the item type must fit, the item must have room,
//! and nothing already present may conflict. Only then is the grant
//! committed and handed to the gateway.
//!
//! Validation and commit for one item run under that item's own lock, so
//! two racing applies cannot both squeeze past the capacity or conflict
//! checks. A failed persistence write is logged and does not roll back the
//! in-memory grant; the database catches up on the next write of that row.

use log::warn;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::EnchantConfig;
use crate::registry::{DefinitionStore, EnchantmentDefinition, Tier};
use crate::storage::{PersistenceGateway, StatisticKind, StorageError};

/// Why an apply or remove was refused, in the order the checks run.
#[derive(Debug, Error)]
pub enum EnchantError {
    #[error("unknown enchantment: {0}")]
    Unregistered(String),

    #[error("{id} has no level {level} (levels run 1..={max})")]
    InvalidLevel { id: String, level: u32, max: u32 },

    #[error("player {player} may not use {tier} enchantments")]
    Unauthorized { player: Uuid, tier: Tier },

    #[error("{id} cannot go on {item_type}")]
    NotApplicable { id: String, item_type: String },

    #[error("item already carries {max} enchantments")]
    CapacityExceeded { max: u32 },

    #[error("{id} conflicts with {with} already on the item")]
    ConflictDetected { id: String, with: String },

    #[error("{id} is not on this item")]
    NotPresent { id: String },
}

/// Decides whether a player may use enchantments of a given tier. The host
/// wires this to its own permission system; [`AllowAll`] is the default.
pub trait TierAccess: Send + Sync {
    fn can_use_tier(&self, player: Uuid, tier: Tier) -> bool;
}

/// Grants every tier to everyone.
pub struct AllowAll;

impl TierAccess for AllowAll {
    fn can_use_tier(&self, _player: Uuid, _tier: Tier) -> bool {
        true
    }
}

/// A committed apply. `previous_level` is set when this was an upgrade.
/// The database write rides a background task; await `persistence` when
/// durability matters.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub enchantment: Arc<EnchantmentDefinition>,
    pub level: u32,
    pub previous_level: Option<u32>,
    pub persistence: JoinHandle<()>,
}

/// A committed remove.
#[derive(Debug)]
pub struct RemoveOutcome {
    pub removed_level: u32,
    pub persistence: JoinHandle<()>,
}

/// Everything cleared off one item.
pub struct ClearOutcome {
    pub removed: Vec<String>,
    pub persistence: JoinHandle<()>,
}

type ItemKey = (Uuid, Uuid);
type ItemEntry = Arc<Mutex<HashMap<String, u32>>>;

/// Enforces the apply/remove protocol and keeps the authoritative
/// in-memory view of per-item grants.
pub struct ApplicationValidator {
    store: Arc<DefinitionStore>,
    gateway: Arc<PersistenceGateway>,
    tier_access: Arc<dyn TierAccess>,
    options: EnchantConfig,
    items: RwLock<HashMap<ItemKey, ItemEntry>>,
}

impl ApplicationValidator {
    pub fn new(
        store: Arc<DefinitionStore>,
        gateway: Arc<PersistenceGateway>,
        tier_access: Arc<dyn TierAccess>,
        options: EnchantConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            tier_access,
            options,
            items: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, player: Uuid, item: Uuid) -> ItemEntry {
        let key = (player, item);
        {
            let items = self.items.read().unwrap();
            if let Some(entry) = items.get(&key) {
                return entry.clone();
            }
        }
        let mut items = self.items.write().unwrap();
        items
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(HashMap::new())))
            .clone()
    }

    /// Validate and commit one enchantment onto an item. Must be called
    /// from within the async runtime; the database write is backgrounded.
    pub fn apply(
        &self,
        player: Uuid,
        item: Uuid,
        item_type: &str,
        enchantment_id: &str,
        level: u32,
    ) -> Result<ApplyOutcome, EnchantError> {
        let def = self
            .store
            .enchantment(enchantment_id)
            .ok_or_else(|| EnchantError::Unregistered(enchantment_id.to_uppercase()))?;

        if !def.is_valid_level(level) {
            return Err(EnchantError::InvalidLevel {
                id: def.id.clone(),
                level,
                max: def.max_level,
            });
        }

        if !self.tier_access.can_use_tier(player, def.tier) {
            return Err(EnchantError::Unauthorized {
                player,
                tier: def.tier,
            });
        }

        if !def.can_apply_to(item_type) {
            return Err(EnchantError::NotApplicable {
                id: def.id.clone(),
                item_type: item_type.to_string(),
            });
        }

        let entry = self.entry(player, item);
        let mut grants = entry.lock().unwrap();

        let upgrading = grants.contains_key(&def.id);
        if !upgrading && grants.len() >= self.options.max_per_item as usize {
            return Err(EnchantError::CapacityExceeded {
                max: self.options.max_per_item,
            });
        }

        if self.options.check_conflicts {
            // Sorted so the reported conflict is deterministic.
            let mut present: Vec<&String> = grants.keys().collect();
            present.sort();
            for existing in present {
                if *existing == def.id {
                    continue;
                }
                if self.store.conflicts(existing, &def.id) {
                    return Err(EnchantError::ConflictDetected {
                        id: def.id.clone(),
                        with: existing.clone(),
                    });
                }
            }
        }

        let previous_level = grants.insert(def.id.clone(), level);
        drop(grants);

        let gateway = self.gateway.clone();
        let id = def.id.clone();
        let track = self.options.track_statistics;
        let persistence = tokio::spawn(async move {
            if let Err(e) = gateway.save_enchantment(player, item, &id, level).await {
                warn!("failed to persist {} on item {}: {}", id, item, e);
            }
            if track {
                if let Err(e) = gateway
                    .increment_statistic(&id, StatisticKind::Applications)
                    .await
                {
                    warn!("failed to count application of {}: {}", id, e);
                }
            }
        });

        Ok(ApplyOutcome {
            enchantment: def,
            level,
            previous_level,
            persistence,
        })
    }

    /// Take one enchantment off an item.
    pub fn remove(
        &self,
        player: Uuid,
        item: Uuid,
        enchantment_id: &str,
    ) -> Result<RemoveOutcome, EnchantError> {
        let key = enchantment_id.to_uppercase();
        let entry = self.entry(player, item);
        let mut grants = entry.lock().unwrap();
        let removed_level = grants
            .remove(&key)
            .ok_or(EnchantError::NotPresent { id: key.clone() })?;
        drop(grants);

        let gateway = self.gateway.clone();
        let track = self.options.track_statistics;
        let persistence = tokio::spawn(async move {
            if let Err(e) = gateway.remove_enchantment(player, item, &key).await {
                warn!("failed to delete {} from item {}: {}", key, item, e);
            }
            if track {
                if let Err(e) = gateway
                    .increment_statistic(&key, StatisticKind::Removals)
                    .await
                {
                    warn!("failed to count removal of {}: {}", key, e);
                }
            }
        });

        Ok(RemoveOutcome {
            removed_level,
            persistence,
        })
    }

    /// Strip an item bare. Each removed id gets its own delete and its own
    /// removal count, same as single removes would.
    pub fn clear_item(&self, player: Uuid, item: Uuid) -> ClearOutcome {
        let entry = self.entry(player, item);
        let mut grants = entry.lock().unwrap();
        let mut removed: Vec<String> = grants.drain().map(|(id, _)| id).collect();
        removed.sort();
        drop(grants);

        let gateway = self.gateway.clone();
        let ids = removed.clone();
        let track = self.options.track_statistics;
        let persistence = tokio::spawn(async move {
            for id in ids {
                if let Err(e) = gateway.remove_enchantment(player, item, &id).await {
                    warn!("failed to delete {} from item {}: {}", id, item, e);
                }
                if track {
                    if let Err(e) = gateway
                        .increment_statistic(&id, StatisticKind::Removals)
                        .await
                    {
                        warn!("failed to count removal of {}: {}", id, e);
                    }
                }
            }
        });

        ClearOutcome {
            removed,
            persistence,
        }
    }

    /// Snapshot of what an item carries right now.
    pub fn enchantments_on(&self, player: Uuid, item: Uuid) -> HashMap<String, u32> {
        let entry = self.entry(player, item);
        let grants = entry.lock().unwrap();
        grants.clone()
    }

    /// Replace the in-memory set for an item with what the database holds.
    /// Used when an item is first seen after a restart.
    pub async fn hydrate(
        &self,
        player: Uuid,
        item: Uuid,
    ) -> Result<HashMap<String, u32>, StorageError> {
        let loaded = self.gateway.load_enchantments(player, item).await?;
        let entry = self.entry(player, item);
        let mut grants = entry.lock().unwrap();
        *grants = loaded.clone();
        Ok(loaded)
    }

    /// Drop the in-memory entries for a player, for when they disconnect.
    /// Stored rows are untouched; `hydrate` brings them back.
    pub fn forget_player(&self, player: Uuid) {
        self.items
            .write()
            .unwrap()
            .retain(|(owner, _), _| *owner != player);
    }
}
