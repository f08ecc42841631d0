//! Definition pack loader.
//!
//! Packs are JSON documents with `enchantments` and `abilities` arrays.
//! Each entry is parsed and validated on its own, so one malformed
//! definition is skipped with a warning instead of poisoning the file.
//! This lets operators curate content without recompiling.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::ability::{AbilityDefinition, AbilityKind, Effect, EffectKind, Trigger};
use super::enchantment::{Category, EnchantmentDefinition, ItemClass, LevelSpec, Tier};
use super::DefinitionError;

/// Parsed pack contents, ready for `DefinitionStore::load`.
#[derive(Debug, Default)]
pub struct DefinitionPack {
    pub enchantments: Vec<EnchantmentDefinition>,
    pub abilities: Vec<AbilityDefinition>,
}

/// Load a definition pack from a JSON file. Entries that fail to parse are
/// skipped with a warning; file-level problems are errors.
pub fn load_pack_from_json<P: AsRef<Path>>(path: P) -> Result<DefinitionPack, DefinitionError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| DefinitionError::Read {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: PackFile = serde_json::from_str(&contents).map_err(|e| DefinitionError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;

    let mut pack = DefinitionPack::default();

    for entry in file.enchantments {
        match serde_json::from_value::<EnchantmentSeed>(entry) {
            Ok(seed) => pack.enchantments.push(seed.into_definition()),
            Err(e) => warn!("{}: skipping malformed enchantment entry: {}", path.display(), e),
        }
    }

    for entry in file.abilities {
        match serde_json::from_value::<AbilitySeed>(entry) {
            Ok(seed) => pack.abilities.push(seed.into_definition()),
            Err(e) => warn!("{}: skipping malformed ability entry: {}", path.display(), e),
        }
    }

    Ok(pack)
}

/// Render the built-in starter pack as pretty JSON, the content `init`
/// writes so a fresh install has something to enchant with.
pub fn starter_pack_json() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&starter_pack_file())
}

/// The starter pack parsed into definitions, used by tests and by `check`
/// when no pack file exists yet.
pub fn starter_pack() -> DefinitionPack {
    let file = starter_pack_file();
    DefinitionPack {
        enchantments: file
            .enchantments
            .into_iter()
            .filter_map(|v| serde_json::from_value::<EnchantmentSeed>(v).ok())
            .map(EnchantmentSeed::into_definition)
            .collect(),
        abilities: file
            .abilities
            .into_iter()
            .filter_map(|v| serde_json::from_value::<AbilitySeed>(v).ok())
            .map(AbilitySeed::into_definition)
            .collect(),
    }
}

// ============================================================================
// Seed structures matching the JSON pack format
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct PackFile {
    #[serde(default)]
    enchantments: Vec<Value>,
    #[serde(default)]
    abilities: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnchantmentSeed {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    tier: Tier,
    category: Category,
    item_class: ItemClass,
    max_level: u32,
    #[serde(default)]
    levels: HashMap<u32, LevelSeed>,
    #[serde(default)]
    applicable_items: Vec<String>,
    #[serde(default)]
    conflicts: Vec<String>,
    #[serde(default)]
    synergies: Vec<String>,
    #[serde(default)]
    requires_faction: bool,
    #[serde(default)]
    required_faction_power: u32,
    #[serde(default)]
    particle: Option<String>,
    #[serde(default)]
    sound: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct LevelSeed {
    #[serde(default)]
    cost: u32,
    #[serde(default)]
    properties: HashMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AbilitySeed {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    kind: AbilityKind,
    tier: Tier,
    trigger: Trigger,
    #[serde(default)]
    cooldown: u64,
    #[serde(default)]
    resource_cost: u32,
    #[serde(default)]
    required_enchantments: HashMap<String, u32>,
    #[serde(default)]
    required_abilities: Vec<String>,
    #[serde(default)]
    effects: Vec<EffectSeed>,
    #[serde(default)]
    sound: Option<String>,
    #[serde(default)]
    particle: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EffectSeed {
    kind: EffectKind,
    #[serde(default)]
    properties: HashMap<String, Value>,
}

impl EnchantmentSeed {
    fn into_definition(self) -> EnchantmentDefinition {
        let mut def = EnchantmentDefinition::new(
            &self.id,
            &self.name,
            self.tier,
            self.category,
            self.item_class,
            self.max_level,
        )
        .with_description(&self.description);

        for (level, seed) in self.levels {
            def = def.with_level(
                level,
                LevelSpec {
                    cost: seed.cost,
                    properties: seed.properties,
                },
            );
        }

        let items: Vec<&str> = self.applicable_items.iter().map(String::as_str).collect();
        def = def.with_applicable_items(&items);
        let conflicts: Vec<&str> = self.conflicts.iter().map(String::as_str).collect();
        def = def.with_conflicts(&conflicts);
        let synergies: Vec<&str> = self.synergies.iter().map(String::as_str).collect();
        def = def.with_synergies(&synergies);

        if self.requires_faction {
            def = def.with_faction_requirement(self.required_faction_power);
        }
        if let Some(particle) = &self.particle {
            def = def.with_particle(particle);
        }
        if let Some(sound) = &self.sound {
            def = def.with_sound(sound);
        }
        def
    }
}

impl AbilitySeed {
    fn into_definition(self) -> AbilityDefinition {
        let mut def = AbilityDefinition::new(&self.id, &self.name, self.kind, self.tier, self.trigger)
            .with_description(&self.description)
            .with_cooldown(self.cooldown)
            .with_resource_cost(self.resource_cost);

        for (id, min_level) in self.required_enchantments {
            def = def.with_required_enchantment(&id, min_level);
        }
        for id in &self.required_abilities {
            def = def.with_required_ability(id);
        }
        for effect in self.effects {
            let mut e = Effect::new(effect.kind);
            e.properties = effect.properties;
            def = def.with_effect(e);
        }
        if let Some(sound) = &self.sound {
            def = def.with_sound(sound);
        }
        if let Some(particle) = &self.particle {
            def = def.with_particle(particle);
        }
        def
    }
}

fn starter_pack_file() -> PackFile {
    use serde_json::json;

    PackFile {
        enchantments: vec![
            json!({
                "id": "LIFESTEAL",
                "name": "Lifesteal",
                "description": "Heal for a portion of the damage you deal.",
                "tier": "rare",
                "category": "combat",
                "item_class": "weapon",
                "max_level": 3,
                "levels": {
                    "1": { "cost": 5000, "properties": { "heal-percent": 10 } },
                    "2": { "cost": 12000, "properties": { "heal-percent": 20 } },
                    "3": { "cost": 25000, "properties": { "heal-percent": 30 } }
                },
                "applicable_items": ["SWORD", "AXE"],
                "conflicts": ["POISON_STRIKE"],
                "particle": "HEART",
                "sound": "ENTITY_PLAYER_LEVELUP"
            }),
            json!({
                "id": "POISON_STRIKE",
                "name": "Poison Strike",
                "description": "Coat your strikes in venom.",
                "tier": "rare",
                "category": "combat",
                "item_class": "weapon",
                "max_level": 3,
                "levels": {
                    "1": { "cost": 5000, "properties": { "duration-secs": 3 } },
                    "2": { "cost": 12000, "properties": { "duration-secs": 5 } },
                    "3": { "cost": 25000, "properties": { "duration-secs": 8 } }
                },
                "applicable_items": ["SWORD"],
                "conflicts": ["LIFESTEAL"],
                "particle": "SLIME",
                "sound": "ENTITY_SPIDER_HURT"
            }),
            json!({
                "id": "CRITICAL_STRIKE",
                "name": "Critical Strike",
                "description": "A chance to land a devastating blow.",
                "tier": "epic",
                "category": "combat",
                "item_class": "weapon",
                "max_level": 4,
                "levels": {
                    "1": { "cost": 8000, "properties": { "crit-chance": 5 } },
                    "2": { "cost": 16000, "properties": { "crit-chance": 10 } },
                    "3": { "cost": 32000, "properties": { "crit-chance": 15 } },
                    "4": { "cost": 64000, "properties": { "crit-chance": 22 } }
                },
                "particle": "CRIT",
                "sound": "ENTITY_PLAYER_ATTACK_CRIT"
            }),
            json!({
                "id": "IRON_SKIN",
                "name": "Iron Skin",
                "description": "Shrug off part of every hit.",
                "tier": "common",
                "category": "combat",
                "item_class": "armor",
                "max_level": 4,
                "levels": {
                    "1": { "cost": 2000, "properties": { "damage-reduction": 4 } },
                    "2": { "cost": 4000, "properties": { "damage-reduction": 8 } },
                    "3": { "cost": 8000, "properties": { "damage-reduction": 12 } },
                    "4": { "cost": 16000, "properties": { "damage-reduction": 16 } }
                }
            }),
            json!({
                "id": "HASTE",
                "name": "Haste",
                "description": "Work faster with this tool.",
                "tier": "common",
                "category": "utility",
                "item_class": "tool",
                "max_level": 3,
                "levels": {
                    "1": { "cost": 1500, "properties": { "speed-bonus": 10 } },
                    "2": { "cost": 3000, "properties": { "speed-bonus": 20 } },
                    "3": { "cost": 6000, "properties": { "speed-bonus": 30 } }
                }
            }),
            json!({
                "id": "TERRITORY_GUARD",
                "name": "Territory Guard",
                "description": "Fight harder on claimed ground.",
                "tier": "epic",
                "category": "faction",
                "item_class": "armor",
                "max_level": 2,
                "levels": {
                    "1": { "cost": 20000, "properties": { "bonus-percent": 10 } },
                    "2": { "cost": 40000, "properties": { "bonus-percent": 20 } }
                },
                "requires_faction": true,
                "required_faction_power": 50,
                "synergies": ["IRON_SKIN"]
            }),
        ],
        abilities: vec![
            json!({
                "id": "VAMPIRIC_BURST",
                "name": "Vampiric Burst",
                "description": "Drain everything around you.",
                "kind": "active",
                "tier": "epic",
                "trigger": "sneak_right_click",
                "cooldown": 45,
                "resource_cost": 20,
                "required_enchantments": { "LIFESTEAL": 2 },
                "effects": [
                    { "kind": "area_damage", "properties": { "radius": 4.0, "damage": 6.0 } },
                    { "kind": "heal", "properties": { "amount": 8.0 } }
                ],
                "sound": "ENTITY_WITHER_SHOOT",
                "particle": "HEART"
            }),
            json!({
                "id": "SHADOW_DASH",
                "name": "Shadow Dash",
                "description": "Blink forward in a puff of smoke.",
                "kind": "active",
                "tier": "rare",
                "trigger": "double_sneak",
                "cooldown": 30,
                "resource_cost": 10,
                "effects": [
                    { "kind": "teleport", "properties": { "distance": 8.0 } },
                    { "kind": "particle", "properties": { "type": "SMOKE" } }
                ],
                "sound": "ENTITY_ENDERMAN_TELEPORT"
            }),
            json!({
                "id": "LAST_STAND",
                "name": "Last Stand",
                "description": "Refuse to fall when it matters.",
                "kind": "passive",
                "tier": "legendary",
                "trigger": "entity_damage",
                "cooldown": 300,
                "required_enchantments": { "IRON_SKIN": 3 },
                "effects": [
                    { "kind": "damage_absorb", "properties": { "amount": 10.0 } },
                    { "kind": "heal", "properties": { "amount": 4.0 } }
                ]
            }),
        ],
    }
}
