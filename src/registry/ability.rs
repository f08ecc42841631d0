//! Ability definition model: triggers, effect descriptors and the
//! requirements an ability places on the player's loadout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::enchantment::Tier;
use super::DefinitionError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AbilityKind {
    /// Fired explicitly by a player input.
    Active,
    /// Always on while the requirements hold; the event layer polls it.
    Passive,
    /// Fired by an input sequence the event layer recognizes.
    Combo,
}

impl AbilityKind {
    pub fn all() -> [AbilityKind; 3] {
        [AbilityKind::Active, AbilityKind::Passive, AbilityKind::Combo]
    }

    pub fn parse(s: &str) -> Option<AbilityKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(AbilityKind::Active),
            "passive" => Some(AbilityKind::Passive),
            "combo" => Some(AbilityKind::Combo),
            _ => None,
        }
    }
}

/// Input events an ability can bind to. The engine never listens for these
/// itself; the host's event layer maps its own inputs onto this set and
/// asks the store which abilities care.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    RightClick,
    LeftClick,
    Sneak,
    SneakRightClick,
    DoubleSneak,
    EntityDamage,
    EntityDamagedByEntity,
    EntityDeath,
    PlayerDeath,
    BlockBreak,
    CriticalHit,
    ItemEquipped,
}

/// Effect vocabulary. Each kind is a tag the host's effect sink interprets;
/// parameters ride in the effect's property bag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Lightning,
    Particle,
    Teleport,
    Invisibility,
    Potion,
    Heal,
    Fireball,
    Fire,
    Freeze,
    Projectile,
    HealOnHit,
    AreaDamage,
    ChainDamage,
    DamageAbsorb,
    BonusDrops,
    Revive,
    MultiElement,
    DamageReduction,
    ReflectDamage,
}

/// One step of an ability's effect list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Effect {
    pub kind: EffectKind,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl Effect {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
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

/// A registered ability. Ids and requirement keys are uppercased at
/// construction, matching enchantment definitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AbilityDefinition {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub kind: AbilityKind,
    pub tier: Tier,
    /// Seconds between uses per player. Zero means no cooldown.
    #[serde(default)]
    pub cooldown_secs: u64,
    /// Abstract resource drained on use; the host decides what it means.
    #[serde(default)]
    pub resource_cost: u32,
    /// Enchantment id to the minimum level the player must carry.
    #[serde(default)]
    pub required_enchantments: HashMap<String, u32>,
    /// Other ability ids the player must already have unlocked.
    #[serde(default)]
    pub required_abilities: Vec<String>,
    pub trigger: Trigger,
    /// Dispatched to the effect sink in declared order.
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub sound: Option<String>,
    #[serde(default)]
    pub particle: Option<String>,
}

impl AbilityDefinition {
    pub fn new(
        id: &str,
        display_name: &str,
        kind: AbilityKind,
        tier: Tier,
        trigger: Trigger,
    ) -> Self {
        Self {
            id: id.trim().to_uppercase(),
            display_name: display_name.to_string(),
            description: String::new(),
            kind,
            tier,
            cooldown_secs: 0,
            resource_cost: 0,
            required_enchantments: HashMap::new(),
            required_abilities: Vec::new(),
            trigger,
            effects: Vec::new(),
            sound: None,
            particle: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_cooldown(mut self, secs: u64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    pub fn with_resource_cost(mut self, cost: u32) -> Self {
        self.resource_cost = cost;
        self
    }

    pub fn with_required_enchantment(mut self, id: &str, min_level: u32) -> Self {
        self.required_enchantments
            .insert(id.trim().to_uppercase(), min_level);
        self
    }

    pub fn with_required_ability(mut self, id: &str) -> Self {
        self.required_abilities.push(id.trim().to_uppercase());
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_sound(mut self, sound: &str) -> Self {
        self.sound = Some(sound.to_string());
        self
    }

    pub fn with_particle(mut self, particle: &str) -> Self {
        self.particle = Some(particle.to_string());
        self
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.id.is_empty() {
            return Err(DefinitionError::EmptyId);
        }
        for (req, &min_level) in &self.required_enchantments {
            if min_level == 0 {
                return Err(DefinitionError::ZeroRequirement {
                    id: self.id.clone(),
                    requirement: req.clone(),
                });
            }
        }
        Ok(())
    }

    /// Human-readable cooldown, coarsest unit that fits: "2h", "5m", "45s".
    pub fn cooldown_display(&self) -> String {
        if self.cooldown_secs >= 3600 {
            format!("{}h", self.cooldown_secs / 3600)
        } else if self.cooldown_secs >= 60 {
            format!("{}m", self.cooldown_secs / 60)
        } else {
            format!("{}s", self.cooldown_secs)
        }
    }
}
