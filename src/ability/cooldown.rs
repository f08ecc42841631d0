//! Per-player ability cooldowns.
//!
//! Expiry timestamps, not timers: setting a cooldown stores when it ends,
//! and expiry is observed lazily on the next query for that key. Nothing
//! sweeps the map in the background; `clear_all` is the manual reclaim
//! path for players who go away.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Tracks when each (player, ability) pair may fire again. Ability keys
/// are uppercased so lookups stay case-insensitive like the registry.
pub struct CooldownTracker {
    cooldowns: RwLock<HashMap<Uuid, HashMap<String, DateTime<Utc>>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self {
            cooldowns: RwLock::new(HashMap::new()),
        }
    }

    /// True when the pair has no cooldown or it has expired. An expired
    /// entry is dropped on the way out.
    pub fn can_use(&self, player: Uuid, ability_id: &str) -> bool {
        self.can_use_at(player, ability_id, Utc::now())
    }

    /// `can_use` against a caller-supplied clock.
    pub fn can_use_at(&self, player: Uuid, ability_id: &str, now: DateTime<Utc>) -> bool {
        let key = ability_id.to_uppercase();
        let expired = {
            let map = self.cooldowns.read().unwrap();
            match map.get(&player).and_then(|per| per.get(&key)) {
                None => return true,
                Some(expiry) => now >= *expiry,
            }
        };
        if !expired {
            return false;
        }
        let mut map = self.cooldowns.write().unwrap();
        if let Some(per) = map.get_mut(&player) {
            // Re-check under the write lock; another caller may have set a
            // fresh cooldown between the two locks.
            if per.get(&key).map_or(false, |expiry| now >= *expiry) {
                per.remove(&key);
                if per.is_empty() {
                    map.remove(&player);
                }
            } else if per.contains_key(&key) {
                return false;
            }
        }
        true
    }

    /// Whole seconds until the pair is usable again, never negative.
    pub fn remaining(&self, player: Uuid, ability_id: &str) -> i64 {
        self.remaining_at(player, ability_id, Utc::now())
    }

    /// `remaining` against a caller-supplied clock.
    pub fn remaining_at(&self, player: Uuid, ability_id: &str, now: DateTime<Utc>) -> i64 {
        let key = ability_id.to_uppercase();
        let map = self.cooldowns.read().unwrap();
        match map.get(&player).and_then(|per| per.get(&key)) {
            None => 0,
            Some(expiry) => expiry.signed_duration_since(now).num_seconds().max(0),
        }
    }

    /// Start a cooldown of `secs` seconds. Zero or negative clears any
    /// existing cooldown instead.
    pub fn set_cooldown(&self, player: Uuid, ability_id: &str, secs: i64) {
        self.set_cooldown_at(player, ability_id, secs, Utc::now());
    }

    /// `set_cooldown` against a caller-supplied clock.
    pub fn set_cooldown_at(&self, player: Uuid, ability_id: &str, secs: i64, now: DateTime<Utc>) {
        let key = ability_id.to_uppercase();
        let mut map = self.cooldowns.write().unwrap();
        if secs <= 0 {
            if let Some(per) = map.get_mut(&player) {
                per.remove(&key);
                if per.is_empty() {
                    map.remove(&player);
                }
            }
            return;
        }
        map.entry(player)
            .or_default()
            .insert(key, now + Duration::seconds(secs));
    }

    /// Drop one pair's cooldown.
    pub fn clear(&self, player: Uuid, ability_id: &str) {
        let key = ability_id.to_uppercase();
        let mut map = self.cooldowns.write().unwrap();
        if let Some(per) = map.get_mut(&player) {
            per.remove(&key);
            if per.is_empty() {
                map.remove(&player);
            }
        }
    }

    /// Drop every cooldown for a player.
    pub fn clear_all(&self, player: Uuid) {
        self.cooldowns.write().unwrap().remove(&player);
    }

    /// Number of players with at least one live entry.
    pub fn tracked_players(&self) -> usize {
        self.cooldowns.read().unwrap().len()
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_pair_is_usable() {
        let tracker = CooldownTracker::new();
        let player = Uuid::new_v4();
        assert!(tracker.can_use(player, "SHADOW_DASH"));
        assert_eq!(tracker.remaining(player, "SHADOW_DASH"), 0);
    }

    #[test]
    fn cooldown_counts_down_and_expires() {
        let tracker = CooldownTracker::new();
        let player = Uuid::new_v4();
        let now = Utc::now();

        tracker.set_cooldown_at(player, "SHADOW_DASH", 10, now);
        assert!(!tracker.can_use_at(player, "SHADOW_DASH", now));
        assert_eq!(tracker.remaining_at(player, "SHADOW_DASH", now), 10);
        assert_eq!(
            tracker.remaining_at(player, "SHADOW_DASH", now + Duration::seconds(4)),
            6
        );
        assert!(tracker.can_use_at(player, "SHADOW_DASH", now + Duration::seconds(10)));
        assert_eq!(
            tracker.remaining_at(player, "SHADOW_DASH", now + Duration::seconds(11)),
            0
        );
    }

    #[test]
    fn expired_entry_is_dropped_lazily() {
        let tracker = CooldownTracker::new();
        let player = Uuid::new_v4();
        let now = Utc::now();

        tracker.set_cooldown_at(player, "SHADOW_DASH", 5, now);
        assert_eq!(tracker.tracked_players(), 1);
        assert!(tracker.can_use_at(player, "SHADOW_DASH", now + Duration::seconds(6)));
        assert_eq!(tracker.tracked_players(), 0);
    }

    #[test]
    fn zero_or_negative_clears() {
        let tracker = CooldownTracker::new();
        let player = Uuid::new_v4();
        let now = Utc::now();

        tracker.set_cooldown_at(player, "SHADOW_DASH", 30, now);
        tracker.set_cooldown_at(player, "SHADOW_DASH", 0, now);
        assert!(tracker.can_use_at(player, "SHADOW_DASH", now));

        tracker.set_cooldown_at(player, "SHADOW_DASH", 30, now);
        tracker.set_cooldown_at(player, "SHADOW_DASH", -5, now);
        assert!(tracker.can_use_at(player, "SHADOW_DASH", now));
    }

    #[test]
    fn ability_keys_are_case_insensitive() {
        let tracker = CooldownTracker::new();
        let player = Uuid::new_v4();
        let now = Utc::now();

        tracker.set_cooldown_at(player, "shadow_dash", 30, now);
        assert!(!tracker.can_use_at(player, "SHADOW_DASH", now));
        assert_eq!(tracker.remaining_at(player, "Shadow_Dash", now), 30);
    }

    #[test]
    fn players_are_independent() {
        let tracker = CooldownTracker::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let now = Utc::now();

        tracker.set_cooldown_at(a, "SHADOW_DASH", 30, now);
        assert!(!tracker.can_use_at(a, "SHADOW_DASH", now));
        assert!(tracker.can_use_at(b, "SHADOW_DASH", now));
    }

    #[test]
    fn clear_and_clear_all() {
        let tracker = CooldownTracker::new();
        let player = Uuid::new_v4();
        let now = Utc::now();

        tracker.set_cooldown_at(player, "SHADOW_DASH", 30, now);
        tracker.set_cooldown_at(player, "VAMPIRIC_BURST", 30, now);
        tracker.clear(player, "SHADOW_DASH");
        assert!(tracker.can_use_at(player, "SHADOW_DASH", now));
        assert!(!tracker.can_use_at(player, "VAMPIRIC_BURST", now));

        tracker.clear_all(player);
        assert!(tracker.can_use_at(player, "VAMPIRIC_BURST", now));
        assert_eq!(tracker.tracked_players(), 0);
    }
}
