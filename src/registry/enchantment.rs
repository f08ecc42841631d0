//! Enchantment definition model: tiers, categories, item classes and the
//! per-level data attached to each enchantment.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::DefinitionError;

/// Rarity tier. Ordering is Common < Rare < Epic < Legendary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Tier {
    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::Common => "Common",
            Tier::Rare => "Rare",
            Tier::Epic => "Epic",
            Tier::Legendary => "Legendary",
        }
    }

    /// Multiplier applied to an enchantment's base cost when pricing an apply.
    pub fn cost_multiplier(&self) -> f64 {
        match self {
            Tier::Common => 1.0,
            Tier::Rare => 2.5,
            Tier::Epic => 5.0,
            Tier::Legendary => 10.0,
        }
    }

    /// Chance that an apply attempt succeeds when the caller rolls for it.
    /// The engine stores the rate; rolling is the caller's concern.
    pub fn success_rate(&self) -> f64 {
        match self {
            Tier::Common => 0.95,
            Tier::Rare => 0.80,
            Tier::Epic => 0.60,
            Tier::Legendary => 0.40,
        }
    }

    pub fn all() -> [Tier; 4] {
        [Tier::Common, Tier::Rare, Tier::Epic, Tier::Legendary]
    }

    /// Parse a tier name, case-insensitively.
    pub fn parse(s: &str) -> Option<Tier> {
        match s.trim().to_ascii_lowercase().as_str() {
            "common" => Some(Tier::Common),
            "rare" => Some(Tier::Rare),
            "epic" => Some(Tier::Epic),
            "legendary" => Some(Tier::Legendary),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Broad grouping used for catalog listings and admin filters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Combat,
    Utility,
    Faction,
}

impl Category {
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Combat => "Combat",
            Category::Utility => "Utility",
            Category::Faction => "Faction",
        }
    }

    pub fn blurb(&self) -> &'static str {
        match self {
            Category::Combat => "Enchantments that enhance combat abilities",
            Category::Utility => "Enchantments that provide utility benefits",
            Category::Faction => "Enchantments that interact with faction mechanics",
        }
    }

    pub fn all() -> [Category; 3] {
        [Category::Combat, Category::Utility, Category::Faction]
    }

    pub fn parse(s: &str) -> Option<Category> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combat" => Some(Category::Combat),
            "utility" => Some(Category::Utility),
            "faction" => Some(Category::Faction),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Fallback item matcher used when a definition lists no explicit
/// applicable items. Matching is substring containment against the
/// uppercased item type tag, so `All` matches everything and `Weapon`
/// matches e.g. `DIAMOND_SWORD` via the `SWORD` tag. `AXE` appears in
/// both the weapon and tool tag lists; an axe item type satisfies both
/// classes, which is intended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemClass {
    Weapon,
    Armor,
    Tool,
    All,
}

impl ItemClass {
    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            ItemClass::Weapon => &["SWORD", "AXE", "BOW"],
            ItemClass::Armor => &["HELMET", "CHESTPLATE", "LEGGINGS", "BOOTS"],
            ItemClass::Tool => &["PICKAXE", "SHOVEL", "AXE", "HOE"],
            ItemClass::All => &["*"],
        }
    }

    /// True when an item of the given type belongs to this class.
    pub fn is_applicable(&self, item_type: &str) -> bool {
        if matches!(self, ItemClass::All) {
            return true;
        }
        let upper = item_type.to_uppercase();
        self.tags().iter().any(|tag| upper.contains(tag))
    }

    pub fn parse(s: &str) -> Option<ItemClass> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weapon" => Some(ItemClass::Weapon),
            "armor" => Some(ItemClass::Armor),
            "tool" => Some(ItemClass::Tool),
            "all" | "*" => Some(ItemClass::All),
            _ => None,
        }
    }
}

/// Per-level data: the base cost of applying this level plus an open-ended
/// property bag the effect layer reads (heal percentages, damage bonuses,
/// whatever the definition author needs).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LevelSpec {
    #[serde(default)]
    pub cost: u32,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl LevelSpec {
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    pub fn prop_f64(&self, key: &str, default: f64) -> f64 {
        self.properties
            .get(key)
            .and_then(|v| v.as_f64())
            .unwrap_or(default)
    }

    pub fn prop_i64(&self, key: &str, default: i64) -> i64 {
        self.properties
            .get(key)
            .and_then(|v| v.as_i64())
            .unwrap_or(default)
    }

    pub fn prop_bool(&self, key: &str, default: bool) -> bool {
        self.properties
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    pub fn prop_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.properties
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
    }
}

/// A registered enchantment. Ids and all id-valued lists are uppercased at
/// construction so lookups and cross-references are case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnchantmentDefinition {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub tier: Tier,
    pub category: Category,
    pub item_class: ItemClass,
    pub max_level: u32,
    #[serde(default)]
    pub levels: HashMap<u32, LevelSpec>,
    /// Explicit item type tags this enchantment applies to. When empty the
    /// item class decides applicability instead.
    #[serde(default)]
    pub applicable_items: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub synergies: Vec<String>,
    #[serde(default)]
    pub requires_faction: bool,
    #[serde(default)]
    pub required_faction_power: u32,
    #[serde(default)]
    pub particle: Option<String>,
    #[serde(default)]
    pub sound: Option<String>,
}

impl EnchantmentDefinition {
    pub fn new(
        id: &str,
        display_name: &str,
        tier: Tier,
        category: Category,
        item_class: ItemClass,
        max_level: u32,
    ) -> Self {
        Self {
            id: id.trim().to_uppercase(),
            display_name: display_name.to_string(),
            description: String::new(),
            tier,
            category,
            item_class,
            max_level,
            levels: HashMap::new(),
            applicable_items: Vec::new(),
            conflicts: Vec::new(),
            synergies: Vec::new(),
            requires_faction: false,
            required_faction_power: 0,
            particle: None,
            sound: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_level(mut self, level: u32, spec: LevelSpec) -> Self {
        self.levels.insert(level, spec);
        self
    }

    pub fn with_applicable_items(mut self, items: &[&str]) -> Self {
        self.applicable_items = items.iter().map(|s| s.trim().to_uppercase()).collect();
        self
    }

    pub fn with_conflicts(mut self, ids: &[&str]) -> Self {
        self.conflicts = ids.iter().map(|s| s.trim().to_uppercase()).collect();
        self
    }

    pub fn with_synergies(mut self, ids: &[&str]) -> Self {
        self.synergies = ids.iter().map(|s| s.trim().to_uppercase()).collect();
        self
    }

    pub fn with_faction_requirement(mut self, power: u32) -> Self {
        self.requires_faction = true;
        self.required_faction_power = power;
        self
    }

    pub fn with_particle(mut self, particle: &str) -> Self {
        self.particle = Some(particle.to_string());
        self
    }

    pub fn with_sound(mut self, sound: &str) -> Self {
        self.sound = Some(sound.to_string());
        self
    }

    /// Check structural soundness. Loaders call this before a definition
    /// reaches the store; a failed definition is skipped, not installed.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.id.is_empty() {
            return Err(DefinitionError::EmptyId);
        }
        if self.max_level == 0 {
            return Err(DefinitionError::ZeroMaxLevel {
                id: self.id.clone(),
            });
        }
        for &level in self.levels.keys() {
            if level == 0 || level > self.max_level {
                return Err(DefinitionError::LevelOutOfRange {
                    id: self.id.clone(),
                    level,
                    max: self.max_level,
                });
            }
        }
        Ok(())
    }

    pub fn is_valid_level(&self, level: u32) -> bool {
        level >= 1 && level <= self.max_level
    }

    /// Per-level data, bounds-checked. Levels inside bounds but absent from
    /// the map return None as well.
    pub fn level(&self, level: u32) -> Option<&LevelSpec> {
        if !self.is_valid_level(level) {
            return None;
        }
        self.levels.get(&level)
    }

    /// Base cost for a level, zero when the level carries no spec.
    pub fn cost_for(&self, level: u32) -> u32 {
        self.level(level).map(|spec| spec.cost).unwrap_or(0)
    }

    /// True when this enchantment may be placed on the given item type.
    /// Explicit applicable items win over the item class fallback; both use
    /// substring containment against the uppercased item type.
    pub fn can_apply_to(&self, item_type: &str) -> bool {
        if self.applicable_items.is_empty() {
            return self.item_class.is_applicable(item_type);
        }
        let upper = item_type.to_uppercase();
        self.applicable_items
            .iter()
            .any(|tag| upper.contains(tag.as_str()))
    }

    /// One-directional conflict check against this definition's own list.
    /// Use the store's `conflicts` for the symmetric check.
    pub fn conflicts_with(&self, other_id: &str) -> bool {
        let upper = other_id.to_uppercase();
        self.conflicts.iter().any(|id| *id == upper)
    }

    /// One-directional synergy check against this definition's own list.
    pub fn has_synergy_with(&self, other_id: &str) -> bool {
        let upper = other_id.to_uppercase();
        self.synergies.iter().any(|id| *id == upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lifesteal() -> EnchantmentDefinition {
        EnchantmentDefinition::new(
            "Lifesteal",
            "Lifesteal",
            Tier::Rare,
            Category::Combat,
            ItemClass::Weapon,
            3,
        )
        .with_description("Heal for a portion of damage dealt")
        .with_level(1, LevelSpec::new(5000).with_property("heal-percent", json!(10)))
        .with_level(2, LevelSpec::new(12000).with_property("heal-percent", json!(20)))
        .with_level(3, LevelSpec::new(25000).with_property("heal-percent", json!(30)))
        .with_applicable_items(&["SWORD", "AXE"])
        .with_conflicts(&["POISON_STRIKE"])
        .with_particle("HEART")
        .with_sound("ENTITY_PLAYER_LEVELUP")
    }

    #[test]
    fn id_and_lists_are_uppercased() {
        let def = lifesteal();
        assert_eq!(def.id, "LIFESTEAL");
        assert_eq!(def.applicable_items, vec!["SWORD", "AXE"]);
        assert!(def.conflicts_with("poison_strike"));
    }

    #[test]
    fn level_bounds() {
        let def = lifesteal();
        assert!(!def.is_valid_level(0));
        assert!(def.is_valid_level(1));
        assert!(def.is_valid_level(3));
        assert!(!def.is_valid_level(4));
        assert!(def.level(0).is_none());
        assert!(def.level(4).is_none());
        assert_eq!(def.cost_for(2), 12000);
        assert_eq!(def.cost_for(4), 0);
    }

    #[test]
    fn level_properties() {
        let def = lifesteal();
        let spec = def.level(3).unwrap();
        assert_eq!(spec.prop_f64("heal-percent", 0.0), 30.0);
        assert_eq!(spec.prop_f64("missing", 7.5), 7.5);
    }

    #[test]
    fn explicit_items_win_over_class() {
        let def = lifesteal();
        assert!(def.can_apply_to("DIAMOND_SWORD"));
        assert!(def.can_apply_to("iron_axe"));
        // Bow is in the weapon class but not in the explicit list.
        assert!(!def.can_apply_to("BOW"));
    }

    #[test]
    fn class_fallback_when_no_explicit_items() {
        let def = EnchantmentDefinition::new(
            "IRON_SKIN",
            "Iron Skin",
            Tier::Common,
            Category::Combat,
            ItemClass::Armor,
            4,
        );
        assert!(def.can_apply_to("DIAMOND_CHESTPLATE"));
        assert!(def.can_apply_to("leather_boots"));
        assert!(!def.can_apply_to("DIAMOND_SWORD"));
    }

    #[test]
    fn axe_satisfies_both_weapon_and_tool() {
        assert!(ItemClass::Weapon.is_applicable("DIAMOND_AXE"));
        assert!(ItemClass::Tool.is_applicable("DIAMOND_AXE"));
    }

    #[test]
    fn all_class_matches_everything() {
        assert!(ItemClass::All.is_applicable("STICK"));
        assert!(ItemClass::All.is_applicable(""));
    }

    #[test]
    fn validate_rejects_bad_shapes() {
        let empty = EnchantmentDefinition::new(
            "  ",
            "Nameless",
            Tier::Common,
            Category::Utility,
            ItemClass::All,
            1,
        );
        assert!(matches!(empty.validate(), Err(DefinitionError::EmptyId)));

        let zero_max = EnchantmentDefinition::new(
            "HASTE",
            "Haste",
            Tier::Common,
            Category::Utility,
            ItemClass::Tool,
            0,
        );
        assert!(matches!(
            zero_max.validate(),
            Err(DefinitionError::ZeroMaxLevel { .. })
        ));

        let stray_level = EnchantmentDefinition::new(
            "HASTE",
            "Haste",
            Tier::Common,
            Category::Utility,
            ItemClass::Tool,
            2,
        )
        .with_level(5, LevelSpec::new(100));
        assert!(matches!(
            stray_level.validate(),
            Err(DefinitionError::LevelOutOfRange { level: 5, .. })
        ));
    }

    #[test]
    fn tier_table() {
        assert_eq!(Tier::Legendary.cost_multiplier(), 10.0);
        assert_eq!(Tier::Common.success_rate(), 0.95);
        assert!(Tier::Common < Tier::Legendary);
        assert_eq!(Tier::parse("EPIC"), Some(Tier::Epic));
        assert_eq!(Tier::parse("mythic"), None);
    }
}
