//! Player-triggered abilities: cooldown tracking and the activation
//! pipeline.
//!
//! [`CooldownTracker`] owns the per-(player, ability) expiry map;
//! [`AbilityActivator`] runs the gate sequence and talks to the host
//! through the [`PlayerLoadout`] and [`EffectSink`] seams.

pub mod activator;
pub mod cooldown;

pub use activator::{Activation, AbilityActivator, ActivationError, EffectSink, PlayerLoadout};
pub use cooldown::CooldownTracker;
