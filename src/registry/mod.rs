//! Definition registry: the catalog of enchantments and abilities plus the
//! indexed, concurrency-safe store the rest of the engine reads from.
//!
//! The store keeps its whole catalog in an immutable snapshot behind a
//! read-write lock. Readers clone the snapshot handle and query it without
//! holding the lock; a reload builds a complete replacement off-lock and
//! swaps it in one write, so no reader ever sees a half-built index.

pub mod ability;
pub mod enchantment;
pub mod loader;

pub use ability::{AbilityDefinition, AbilityKind, Effect, EffectKind, Trigger};
pub use enchantment::{Category, EnchantmentDefinition, ItemClass, LevelSpec, Tier};
pub use loader::{load_pack_from_json, starter_pack, starter_pack_json, DefinitionPack};

use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::logutil::escape_log;

/// Errors raised while building or loading definitions.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// Definition has a blank id after trimming.
    #[error("definition id is empty")]
    EmptyId,

    /// Enchantment declares a max level of zero.
    #[error("{id}: max level must be at least 1")]
    ZeroMaxLevel { id: String },

    /// Level table entry falls outside the declared level range.
    #[error("{id}: level {level} outside 1..={max}")]
    LevelOutOfRange { id: String, level: u32, max: u32 },

    /// Ability requires an enchantment at minimum level zero.
    #[error("{id}: requirement {requirement} must ask for at least level 1")]
    ZeroRequirement { id: String, requirement: String },

    /// Definition pack file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Definition pack file is not valid JSON for the pack format.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Loading produced no usable definitions at all.
    #[error("definition pack has no usable definitions")]
    EmptyPack,
}

/// Counts reported by a pack load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub enchantments: usize,
    pub abilities: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    enchantments: HashMap<String, Arc<EnchantmentDefinition>>,
    abilities: HashMap<String, Arc<AbilityDefinition>>,
    by_tier: HashMap<Tier, Vec<Arc<EnchantmentDefinition>>>,
    by_category: HashMap<Category, Vec<Arc<EnchantmentDefinition>>>,
    by_kind: HashMap<AbilityKind, Vec<Arc<AbilityDefinition>>>,
    by_trigger: HashMap<Trigger, Vec<Arc<AbilityDefinition>>>,
}

impl Snapshot {
    /// Rebuild every index from the id maps. Index entries are sorted by id
    /// so listings come out deterministic.
    fn rebuild_indices(&mut self) {
        self.by_tier.clear();
        self.by_category.clear();
        self.by_kind.clear();
        self.by_trigger.clear();

        let mut enchants: Vec<_> = self.enchantments.values().cloned().collect();
        enchants.sort_by(|a, b| a.id.cmp(&b.id));
        for def in enchants {
            self.by_tier.entry(def.tier).or_default().push(def.clone());
            self.by_category
                .entry(def.category)
                .or_default()
                .push(def);
        }

        let mut abilities: Vec<_> = self.abilities.values().cloned().collect();
        abilities.sort_by(|a, b| a.id.cmp(&b.id));
        for def in abilities {
            self.by_kind.entry(def.kind).or_default().push(def.clone());
            self.by_trigger
                .entry(def.trigger)
                .or_default()
                .push(def);
        }
    }
}

/// Thread-safe catalog of enchantment and ability definitions.
pub struct DefinitionStore {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().unwrap().clone()
    }

    /// Register one enchantment. The first registration of an id wins;
    /// later ones are ignored with a warning. Returns true when installed.
    pub fn register_enchantment(
        &self,
        def: EnchantmentDefinition,
    ) -> Result<bool, DefinitionError> {
        def.validate()?;
        let mut guard = self.snapshot.write().unwrap();
        if guard.enchantments.contains_key(&def.id) {
            warn!(
                "enchantment {} already registered, keeping the first",
                escape_log(&def.id)
            );
            return Ok(false);
        }
        let mut next = (**guard).clone();
        next.enchantments.insert(def.id.clone(), Arc::new(def));
        next.rebuild_indices();
        *guard = Arc::new(next);
        Ok(true)
    }

    /// Register one ability. Same first-writer-wins rule as enchantments.
    pub fn register_ability(&self, def: AbilityDefinition) -> Result<bool, DefinitionError> {
        def.validate()?;
        let mut guard = self.snapshot.write().unwrap();
        if guard.abilities.contains_key(&def.id) {
            warn!(
                "ability {} already registered, keeping the first",
                escape_log(&def.id)
            );
            return Ok(false);
        }
        let mut next = (**guard).clone();
        next.abilities.insert(def.id.clone(), Arc::new(def));
        next.rebuild_indices();
        *guard = Arc::new(next);
        Ok(true)
    }

    /// Replace the whole catalog with the pack's contents. Invalid and
    /// duplicate definitions are skipped with a warning; a pack that yields
    /// nothing usable is an error and leaves the current catalog in place.
    pub fn load(&self, pack: DefinitionPack) -> Result<LoadSummary, DefinitionError> {
        let mut next = Snapshot::default();
        let mut summary = LoadSummary::default();

        for def in pack.enchantments {
            if let Err(e) = def.validate() {
                warn!("skipping enchantment definition: {}", e);
                summary.skipped += 1;
                continue;
            }
            if next.enchantments.contains_key(&def.id) {
                warn!(
                    "enchantment {} already registered, keeping the first",
                    escape_log(&def.id)
                );
                summary.skipped += 1;
                continue;
            }
            next.enchantments.insert(def.id.clone(), Arc::new(def));
            summary.enchantments += 1;
        }

        for def in pack.abilities {
            if let Err(e) = def.validate() {
                warn!("skipping ability definition: {}", e);
                summary.skipped += 1;
                continue;
            }
            if next.abilities.contains_key(&def.id) {
                warn!(
                    "ability {} already registered, keeping the first",
                    escape_log(&def.id)
                );
                summary.skipped += 1;
                continue;
            }
            next.abilities.insert(def.id.clone(), Arc::new(def));
            summary.abilities += 1;
        }

        if summary.enchantments == 0 && summary.abilities == 0 {
            return Err(DefinitionError::EmptyPack);
        }

        next.rebuild_indices();
        *self.snapshot.write().unwrap() = Arc::new(next);
        info!(
            "loaded {} enchantments and {} abilities ({} skipped)",
            summary.enchantments, summary.abilities, summary.skipped
        );
        Ok(summary)
    }

    /// Look up an enchantment, case-insensitively.
    pub fn enchantment(&self, id: &str) -> Option<Arc<EnchantmentDefinition>> {
        self.current().enchantments.get(&id.to_uppercase()).cloned()
    }

    /// Look up an ability, case-insensitively.
    pub fn ability(&self, id: &str) -> Option<Arc<AbilityDefinition>> {
        self.current().abilities.get(&id.to_uppercase()).cloned()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.current().enchantments.contains_key(&id.to_uppercase())
    }

    /// All enchantment ids, sorted.
    pub fn enchantment_ids(&self) -> Vec<String> {
        let snap = self.current();
        let mut ids: Vec<String> = snap.enchantments.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// All ability ids, sorted.
    pub fn ability_ids(&self) -> Vec<String> {
        let snap = self.current();
        let mut ids: Vec<String> = snap.abilities.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn enchantment_count(&self) -> usize {
        self.current().enchantments.len()
    }

    pub fn ability_count(&self) -> usize {
        self.current().abilities.len()
    }

    /// Enchantments of one tier, sorted by id.
    pub fn by_tier(&self, tier: Tier) -> Vec<Arc<EnchantmentDefinition>> {
        self.current().by_tier.get(&tier).cloned().unwrap_or_default()
    }

    /// Enchantments of one category, sorted by id.
    pub fn by_category(&self, category: Category) -> Vec<Arc<EnchantmentDefinition>> {
        self.current()
            .by_category
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }

    /// Abilities of one kind, sorted by id.
    pub fn abilities_by_kind(&self, kind: AbilityKind) -> Vec<Arc<AbilityDefinition>> {
        self.current().by_kind.get(&kind).cloned().unwrap_or_default()
    }

    /// Abilities bound to one trigger, sorted by id. The event layer uses
    /// this to resolve which abilities an input may fire.
    pub fn abilities_for_trigger(&self, trigger: Trigger) -> Vec<Arc<AbilityDefinition>> {
        self.current()
            .by_trigger
            .get(&trigger)
            .cloned()
            .unwrap_or_default()
    }

    /// Every registered enchantment that may be placed on the item type.
    pub fn applicable_enchantments(&self, item_type: &str) -> Vec<Arc<EnchantmentDefinition>> {
        let snap = self.current();
        let mut out: Vec<_> = snap
            .enchantments
            .values()
            .filter(|def| def.can_apply_to(item_type))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Symmetric conflict check: true when either side lists the other.
    /// Unknown ids never conflict.
    pub fn conflicts(&self, a: &str, b: &str) -> bool {
        let snap = self.current();
        let (a_def, b_def) = match (
            snap.enchantments.get(&a.to_uppercase()),
            snap.enchantments.get(&b.to_uppercase()),
        ) {
            (Some(x), Some(y)) => (x, y),
            _ => return false,
        };
        a_def.conflicts_with(&b_def.id) || b_def.conflicts_with(&a_def.id)
    }

    /// Symmetric synergy check, same unknown-id rule as `conflicts`.
    pub fn synergizes(&self, a: &str, b: &str) -> bool {
        let snap = self.current();
        let (a_def, b_def) = match (
            snap.enchantments.get(&a.to_uppercase()),
            snap.enchantments.get(&b.to_uppercase()),
        ) {
            (Some(x), Some(y)) => (x, y),
            _ => return false,
        };
        a_def.has_synergy_with(&b_def.id) || b_def.has_synergy_with(&a_def.id)
    }
}

impl Default for DefinitionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(defs: Vec<EnchantmentDefinition>) -> DefinitionStore {
        let store = DefinitionStore::new();
        for def in defs {
            store.register_enchantment(def).unwrap();
        }
        store
    }

    fn poison_strike() -> EnchantmentDefinition {
        EnchantmentDefinition::new(
            "POISON_STRIKE",
            "Poison Strike",
            Tier::Rare,
            Category::Combat,
            ItemClass::Weapon,
            3,
        )
    }

    fn lifesteal() -> EnchantmentDefinition {
        EnchantmentDefinition::new(
            "LIFESTEAL",
            "Lifesteal",
            Tier::Rare,
            Category::Combat,
            ItemClass::Weapon,
            3,
        )
        .with_conflicts(&["POISON_STRIKE"])
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let store = store_with(vec![lifesteal()]);
        assert!(store.enchantment("lifesteal").is_some());
        assert!(store.enchantment("LifeSteal").is_some());
        assert!(store.enchantment("LIFESTEAL").is_some());
        assert!(store.enchantment("VENOM").is_none());
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let store = DefinitionStore::new();
        let first = lifesteal().with_description("first");
        let second = lifesteal().with_description("second");
        assert!(store.register_enchantment(first).unwrap());
        assert!(!store.register_enchantment(second).unwrap());
        let kept = store.enchantment("LIFESTEAL").unwrap();
        assert_eq!(kept.description, "first");
    }

    #[test]
    fn conflict_is_symmetric_even_when_one_sided() {
        // Only LIFESTEAL lists the conflict; the store reports it both ways.
        let store = store_with(vec![lifesteal(), poison_strike()]);
        assert!(store.conflicts("LIFESTEAL", "POISON_STRIKE"));
        assert!(store.conflicts("POISON_STRIKE", "LIFESTEAL"));
    }

    #[test]
    fn conflict_with_unknown_id_is_false() {
        let store = store_with(vec![lifesteal()]);
        assert!(!store.conflicts("LIFESTEAL", "POISON_STRIKE"));
        assert!(!store.conflicts("GHOST", "LIFESTEAL"));
    }

    #[test]
    fn tier_and_category_indices() {
        let epic = EnchantmentDefinition::new(
            "TERRITORY_GUARD",
            "Territory Guard",
            Tier::Epic,
            Category::Faction,
            ItemClass::Armor,
            2,
        );
        let store = store_with(vec![lifesteal(), poison_strike(), epic]);
        let rare = store.by_tier(Tier::Rare);
        assert_eq!(rare.len(), 2);
        assert_eq!(rare[0].id, "LIFESTEAL");
        assert_eq!(rare[1].id, "POISON_STRIKE");
        assert_eq!(store.by_category(Category::Faction).len(), 1);
        assert!(store.by_tier(Tier::Legendary).is_empty());
    }

    #[test]
    fn load_replaces_whole_catalog() {
        let store = store_with(vec![lifesteal()]);
        let pack = DefinitionPack {
            enchantments: vec![poison_strike()],
            abilities: Vec::new(),
        };
        let summary = store.load(pack).unwrap();
        assert_eq!(summary.enchantments, 1);
        assert!(store.enchantment("LIFESTEAL").is_none());
        assert!(store.enchantment("POISON_STRIKE").is_some());
    }

    #[test]
    fn empty_pack_load_fails_and_keeps_catalog() {
        let store = store_with(vec![lifesteal()]);
        let pack = DefinitionPack {
            enchantments: Vec::new(),
            abilities: Vec::new(),
        };
        assert!(matches!(store.load(pack), Err(DefinitionError::EmptyPack)));
        assert!(store.enchantment("LIFESTEAL").is_some());
    }

    #[test]
    fn trigger_index_resolves_abilities() {
        let store = DefinitionStore::new();
        let burst = AbilityDefinition::new(
            "VAMPIRIC_BURST",
            "Vampiric Burst",
            AbilityKind::Active,
            Tier::Epic,
            Trigger::SneakRightClick,
        );
        let dash = AbilityDefinition::new(
            "SHADOW_DASH",
            "Shadow Dash",
            AbilityKind::Active,
            Tier::Rare,
            Trigger::DoubleSneak,
        );
        store.register_ability(burst).unwrap();
        store.register_ability(dash).unwrap();
        let hits = store.abilities_for_trigger(Trigger::SneakRightClick);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "VAMPIRIC_BURST");
        assert!(store.abilities_for_trigger(Trigger::BlockBreak).is_empty());
    }

    #[test]
    fn applicable_enchantments_filters_catalog() {
        let armor = EnchantmentDefinition::new(
            "IRON_SKIN",
            "Iron Skin",
            Tier::Common,
            Category::Combat,
            ItemClass::Armor,
            4,
        );
        let store = store_with(vec![lifesteal(), armor]);
        let sword = store.applicable_enchantments("DIAMOND_SWORD");
        assert_eq!(sword.len(), 1);
        assert_eq!(sword[0].id, "LIFESTEAL");
        let boots = store.applicable_enchantments("IRON_BOOTS");
        assert_eq!(boots.len(), 1);
        assert_eq!(boots[0].id, "IRON_SKIN");
    }
}
