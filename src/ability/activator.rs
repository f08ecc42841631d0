//! Ability activation pipeline.
//!
//! `activate` runs the full gate sequence for one (player, ability) pair:
//! resolve the definition, check the cooldown, check the loadout
//! requirements, dispatch the effect list in declared order, start the
//! cooldown and mark the ability active. The whole sequence holds that
//! pair's activation lock, so two racing activations of the same pair can
//! never both pass the cooldown gate. Different pairs never contend.

use log::warn;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::registry::{AbilityDefinition, DefinitionStore, Effect};
use crate::storage::{PersistenceGateway, StatisticKind};

use super::cooldown::CooldownTracker;

/// Why an activation was refused.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("unknown ability: {0}")]
    UnknownAbility(String),

    #[error("{ability} is on cooldown for another {remaining}s")]
    OnCooldown { ability: String, remaining: i64 },

    #[error("requirements not met for {ability}: missing {missing:?}")]
    RequirementsUnmet {
        ability: String,
        missing: Vec<String>,
    },
}

/// Supplies what the player currently carries. The engine has no idea what
/// an inventory looks like; the host answers these two questions.
pub trait PlayerLoadout: Send + Sync {
    /// Enchantment id to level for everything the player has equipped.
    fn equipped_enchantments(&self, player: Uuid) -> HashMap<String, u32>;

    /// Ability ids the player has already unlocked.
    fn unlocked_abilities(&self, player: Uuid) -> HashSet<String>;
}

/// Receives the effects of a successful activation, one call per effect in
/// declared order. Rendering, sound and game-world changes all live behind
/// this seam; the engine never interprets an effect itself.
pub trait EffectSink: Send + Sync {
    fn dispatch(&self, player: Uuid, ability: &AbilityDefinition, effect: &Effect);
}

/// A successful activation. The use counter is written in the background;
/// hold on to `persistence` and await it when durability matters.
#[derive(Debug)]
pub struct Activation {
    pub ability: Arc<AbilityDefinition>,
    pub persistence: JoinHandle<()>,
}

/// Runs activations against the registry, cooldown tracker and gateway.
pub struct AbilityActivator {
    store: Arc<DefinitionStore>,
    cooldowns: Arc<CooldownTracker>,
    gateway: Arc<PersistenceGateway>,
    loadout: Arc<dyn PlayerLoadout>,
    sink: Arc<dyn EffectSink>,
    active: RwLock<HashMap<Uuid, HashSet<String>>>,
    locks: Mutex<HashMap<(Uuid, String), Arc<Mutex<()>>>>,
}

impl AbilityActivator {
    pub fn new(
        store: Arc<DefinitionStore>,
        cooldowns: Arc<CooldownTracker>,
        gateway: Arc<PersistenceGateway>,
        loadout: Arc<dyn PlayerLoadout>,
        sink: Arc<dyn EffectSink>,
    ) -> Self {
        Self {
            store,
            cooldowns,
            gateway,
            loadout,
            sink,
            active: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn entry_lock(&self, player: Uuid, ability_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry((player, ability_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Try to fire an ability for a player. Must be called from within the
    /// async runtime; the use counter write rides a background task.
    pub fn activate(&self, player: Uuid, ability_id: &str) -> Result<Activation, ActivationError> {
        let def = self
            .store
            .ability(ability_id)
            .ok_or_else(|| ActivationError::UnknownAbility(ability_id.to_uppercase()))?;

        let lock = self.entry_lock(player, &def.id);
        let _guard = lock.lock().unwrap();

        if !self.cooldowns.can_use(player, &def.id) {
            return Err(ActivationError::OnCooldown {
                ability: def.id.clone(),
                remaining: self.cooldowns.remaining(player, &def.id),
            });
        }

        let missing = self.missing_requirements(player, &def);
        if !missing.is_empty() {
            return Err(ActivationError::RequirementsUnmet {
                ability: def.id.clone(),
                missing,
            });
        }

        for effect in &def.effects {
            self.sink.dispatch(player, &def, effect);
        }

        if def.cooldown_secs > 0 {
            self.cooldowns
                .set_cooldown(player, &def.id, def.cooldown_secs as i64);
        }

        self.active
            .write()
            .unwrap()
            .entry(player)
            .or_default()
            .insert(def.id.clone());

        drop(_guard);

        let gateway = self.gateway.clone();
        let id = def.id.clone();
        let persistence = tokio::spawn(async move {
            if let Err(e) = gateway.record_ability_use(player, &id).await {
                warn!("failed to record use of {} for {}: {}", id, player, e);
            }
        });

        Ok(Activation {
            ability: def,
            persistence,
        })
    }

    fn missing_requirements(&self, player: Uuid, def: &AbilityDefinition) -> Vec<String> {
        let equipped: HashMap<String, u32> = self
            .loadout
            .equipped_enchantments(player)
            .into_iter()
            .map(|(id, level)| (id.to_uppercase(), level))
            .collect();
        let unlocked: HashSet<String> = self
            .loadout
            .unlocked_abilities(player)
            .into_iter()
            .map(|id| id.to_uppercase())
            .collect();

        let mut missing = Vec::new();
        for (req, &min_level) in &def.required_enchantments {
            match equipped.get(req) {
                Some(&level) if level >= min_level => {}
                _ => missing.push(format!("{} {}+", req, min_level)),
            }
        }
        for req in &def.required_abilities {
            if !unlocked.contains(req) {
                missing.push(req.clone());
            }
        }
        missing.sort();
        missing
    }

    /// Count one proc of an enchantment's own effect toward its trigger
    /// statistics. Fire-and-log; the handle is returned for callers that
    /// want to await the write.
    pub fn record_trigger(&self, enchantment_id: &str) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        let id = enchantment_id.to_uppercase();
        tokio::spawn(async move {
            if let Err(e) = gateway.increment_statistic(&id, StatisticKind::Triggers).await {
                warn!("failed to count trigger for {}: {}", id, e);
            }
        })
    }

    /// Ability ids currently marked active for a player.
    pub fn active_abilities(&self, player: Uuid) -> HashSet<String> {
        self.active
            .read()
            .unwrap()
            .get(&player)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_active(&self, player: Uuid, ability_id: &str) -> bool {
        let key = ability_id.to_uppercase();
        self.active
            .read()
            .unwrap()
            .get(&player)
            .map_or(false, |set| set.contains(&key))
    }

    /// Unmark one ability. Returns whether it was active.
    pub fn deactivate(&self, player: Uuid, ability_id: &str) -> bool {
        let key = ability_id.to_uppercase();
        let mut active = self.active.write().unwrap();
        let removed = active.get_mut(&player).map_or(false, |set| set.remove(&key));
        if active.get(&player).map_or(false, |set| set.is_empty()) {
            active.remove(&player);
        }
        removed
    }

    /// Drop a player's active set and activation locks, for when the
    /// player disconnects. Cooldowns live in the tracker and are cleared
    /// separately.
    pub fn forget_player(&self, player: Uuid) {
        self.active.write().unwrap().remove(&player);
        self.locks
            .lock()
            .unwrap()
            .retain(|(owner, _), _| *owner != player);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AbilityKind, EffectKind, Tier, Trigger};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct FixedLoadout {
        enchantments: HashMap<String, u32>,
        abilities: HashSet<String>,
    }

    impl PlayerLoadout for FixedLoadout {
        fn equipped_enchantments(&self, _player: Uuid) -> HashMap<String, u32> {
            self.enchantments.clone()
        }
        fn unlocked_abilities(&self, _player: Uuid) -> HashSet<String> {
            self.abilities.clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        dispatched: StdMutex<Vec<(String, EffectKind)>>,
    }

    impl EffectSink for RecordingSink {
        fn dispatch(&self, _player: Uuid, ability: &AbilityDefinition, effect: &Effect) {
            self.dispatched
                .lock()
                .unwrap()
                .push((ability.id.clone(), effect.kind));
        }
    }

    fn burst_def() -> AbilityDefinition {
        AbilityDefinition::new(
            "VAMPIRIC_BURST",
            "Vampiric Burst",
            AbilityKind::Active,
            Tier::Epic,
            Trigger::SneakRightClick,
        )
        .with_cooldown(45)
        .with_required_enchantment("LIFESTEAL", 2)
        .with_effect(Effect::new(EffectKind::AreaDamage).with_property("radius", json!(4.0)))
        .with_effect(Effect::new(EffectKind::Heal).with_property("amount", json!(8.0)))
    }

    fn build(
        dir: &tempfile::TempDir,
        loadout: FixedLoadout,
    ) -> (Arc<AbilityActivator>, Arc<RecordingSink>, Arc<PersistenceGateway>) {
        let store = Arc::new(DefinitionStore::new());
        store.register_ability(burst_def()).unwrap();
        let gateway =
            Arc::new(PersistenceGateway::embedded(&dir.path().join("test.db")).unwrap());
        let sink = Arc::new(RecordingSink::default());
        let activator = Arc::new(AbilityActivator::new(
            store,
            Arc::new(CooldownTracker::new()),
            gateway.clone(),
            Arc::new(loadout),
            sink.clone(),
        ));
        (activator, sink, gateway)
    }

    fn full_loadout() -> FixedLoadout {
        FixedLoadout {
            enchantments: HashMap::from([("LIFESTEAL".to_string(), 2)]),
            abilities: HashSet::new(),
        }
    }

    #[tokio::test]
    async fn unknown_ability_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (activator, _, gateway) = build(&dir, full_loadout());
        let err = activator.activate(Uuid::new_v4(), "NO_SUCH").unwrap_err();
        assert!(matches!(err, ActivationError::UnknownAbility(id) if id == "NO_SUCH"));
        gateway.shutdown();
    }

    #[tokio::test]
    async fn requirements_gate_activation() {
        let dir = tempfile::tempdir().unwrap();
        let weak = FixedLoadout {
            enchantments: HashMap::from([("LIFESTEAL".to_string(), 1)]),
            abilities: HashSet::new(),
        };
        let (activator, sink, gateway) = build(&dir, weak);

        let err = activator.activate(Uuid::new_v4(), "VAMPIRIC_BURST").unwrap_err();
        match err {
            ActivationError::RequirementsUnmet { missing, .. } => {
                assert_eq!(missing, vec!["LIFESTEAL 2+".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(sink.dispatched.lock().unwrap().is_empty());
        gateway.shutdown();
    }

    #[tokio::test]
    async fn activation_dispatches_in_order_and_starts_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let (activator, sink, gateway) = build(&dir, full_loadout());
        let player = Uuid::new_v4();

        let activation = activator.activate(player, "vampiric_burst").unwrap();
        assert_eq!(activation.ability.id, "VAMPIRIC_BURST");
        activation.persistence.await.unwrap();

        let dispatched = sink.dispatched.lock().unwrap().clone();
        assert_eq!(
            dispatched,
            vec![
                ("VAMPIRIC_BURST".to_string(), EffectKind::AreaDamage),
                ("VAMPIRIC_BURST".to_string(), EffectKind::Heal),
            ]
        );
        assert!(activator.is_active(player, "VAMPIRIC_BURST"));

        let err = activator.activate(player, "VAMPIRIC_BURST").unwrap_err();
        assert!(matches!(err, ActivationError::OnCooldown { .. }));

        let records = gateway.load_abilities(player).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uses, 1);
        gateway.shutdown();
    }

    #[tokio::test]
    async fn zero_cooldown_ability_fires_repeatedly() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DefinitionStore::new());
        store
            .register_ability(AbilityDefinition::new(
                "ECHO",
                "Echo",
                AbilityKind::Active,
                Tier::Common,
                Trigger::RightClick,
            ))
            .unwrap();

        let gateway =
            Arc::new(PersistenceGateway::embedded(&dir.path().join("test.db")).unwrap());
        let activator = AbilityActivator::new(
            store,
            Arc::new(CooldownTracker::new()),
            gateway.clone(),
            Arc::new(FixedLoadout {
                enchantments: HashMap::new(),
                abilities: HashSet::new(),
            }),
            Arc::new(RecordingSink::default()),
        );
        let player = Uuid::new_v4();

        for _ in 0..3 {
            let activation = activator.activate(player, "ECHO").unwrap();
            activation.persistence.await.unwrap();
        }
        let records = gateway.load_abilities(player).await.unwrap();
        assert_eq!(records[0].uses, 3);
        gateway.shutdown();
    }

    #[tokio::test]
    async fn missing_prerequisite_ability_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DefinitionStore::new());
        let def = AbilityDefinition::new(
            "FINISHER",
            "Finisher",
            AbilityKind::Combo,
            Tier::Rare,
            Trigger::CriticalHit,
        )
        .with_required_ability("OPENER");
        store.register_ability(def).unwrap();

        let gateway =
            Arc::new(PersistenceGateway::embedded(&dir.path().join("test.db")).unwrap());
        let activator = AbilityActivator::new(
            store,
            Arc::new(CooldownTracker::new()),
            gateway.clone(),
            Arc::new(FixedLoadout {
                enchantments: HashMap::new(),
                abilities: HashSet::new(),
            }),
            Arc::new(RecordingSink::default()),
        );

        let err = activator.activate(Uuid::new_v4(), "FINISHER").unwrap_err();
        match err {
            ActivationError::RequirementsUnmet { missing, .. } => {
                assert_eq!(missing, vec!["OPENER".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        gateway.shutdown();
    }

    #[tokio::test]
    async fn deactivate_and_forget() {
        let dir = tempfile::tempdir().unwrap();
        let (activator, _, gateway) = build(&dir, full_loadout());
        let player = Uuid::new_v4();

        let activation = activator.activate(player, "VAMPIRIC_BURST").unwrap();
        activation.persistence.await.unwrap();
        assert!(activator.deactivate(player, "vampiric_burst"));
        assert!(!activator.deactivate(player, "vampiric_burst"));
        assert!(activator.active_abilities(player).is_empty());

        activator.forget_player(player);
        gateway.shutdown();
    }

    #[tokio::test]
    async fn dead_gateway_does_not_fail_activation() {
        let dir = tempfile::tempdir().unwrap();
        let (activator, _, gateway) = build(&dir, full_loadout());
        gateway.shutdown();

        let activation = activator.activate(Uuid::new_v4(), "VAMPIRIC_BURST").unwrap();
        // The write fails and is logged; the activation itself stands.
        activation.persistence.await.unwrap();
    }
}
