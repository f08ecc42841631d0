//! # Runeforge - Rules Engine for Item Enchantments and Abilities
//!
//! Runeforge is an embeddable rules engine for games that grant custom
//! enchantments to items and triggered magical abilities to players. The
//! host game feeds it definitions and player actions; runeforge decides
//! what is allowed, tracks cooldowns and per-item state, and persists
//! grants and usage counters to a relational store.
//!
//! ## Features
//!
//! - **Definition Registry**: Tiered, categorized enchantment and ability
//!   catalogs loaded from JSON packs, with prebuilt tier/category/trigger
//!   indices and atomic reloads.
//! - **Apply Protocol**: Ordered validation for putting an enchantment on
//!   an item (existence, level range, tier permission, item fit, capacity,
//!   conflicts) with per-item linearizability.
//! - **Ability Activation**: Cooldown gating, requirement checks against
//!   the player's loadout, and ordered effect dispatch to a host-provided
//!   sink.
//! - **Dual-Backend Persistence**: One async gateway over an embedded
//!   single-connection profile or a bounded WAL-mode connection pool.
//! - **Usage Statistics**: Race-free apply/remove/trigger counters and a
//!   reporting CLI.
//! - **Async Design**: Built with Tokio; blocking SQL never runs on the
//!   caller's thread.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use runeforge::config::Config;
//! use runeforge::enchant::{AllowAll, ApplicationValidator};
//! use runeforge::registry::{load_pack_from_json, DefinitionStore};
//! use runeforge::storage::PersistenceGateway;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!
//!     let store = Arc::new(DefinitionStore::new());
//!     store.load(load_pack_from_json(&config.definitions.file)?)?;
//!
//!     let gateway = Arc::new(PersistenceGateway::connect(&config.database)?);
//!     let enchants = ApplicationValidator::new(
//!         store.clone(),
//!         gateway.clone(),
//!         Arc::new(AllowAll),
//!         config.enchant.clone(),
//!     );
//!
//!     let player = uuid::Uuid::new_v4();
//!     let sword = uuid::Uuid::new_v4();
//!     let outcome = enchants.apply(player, sword, "DIAMOND_SWORD", "LIFESTEAL", 1)?;
//!     outcome.persistence.await?;
//!
//!     gateway.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`registry`] - Definition catalog, indices, and the JSON pack loader
//! - [`enchant`] - Apply/remove validation and per-item enchantment state
//! - [`ability`] - Cooldown tracking and ability activation
//! - [`storage`] - Persistence gateway over the embedded or pooled backend
//! - [`stats`] - Statistics reporting
//! - [`config`] - Configuration management
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  Host Game Layer │ ← events, rendering, permissions
//! └──────────────────┘
//!          │
//! ┌──────────────────┐
//! │  Rules Engine    │ ← registry, validator, activator
//! └──────────────────┘
//!          │
//! ┌──────────────────┐
//! │  Persistence     │ ← embedded / pooled SQL gateway
//! │  Gateway         │
//! └──────────────────┘
//! ```
//!
//! The engine never touches rendering or input: effects go out through the
//! [`ability::EffectSink`] trait and permissions come in through
//! [`enchant::TierAccess`].

pub mod ability;
pub mod config;
pub mod enchant;
pub mod logutil;
pub mod registry;
pub mod stats;
pub mod storage;
