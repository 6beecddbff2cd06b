//! Telemetry wire schema
//!
//! These are the wire types for the game's push integration. Only the fields
//! the engine consumes are modeled; everything else in the payload is ignored
//! by serde.

use std::collections::HashMap;

use serde::Deserialize;

/// Top-level push payload
#[derive(Debug, Clone, Deserialize)]
pub struct GsiPayload {
    #[serde(default)]
    pub round: Option<GsiRound>,

    /// Player block; an update without it carries nothing usable
    #[serde(default)]
    pub player: Option<GsiPlayer>,
}

/// Round info
#[derive(Debug, Clone, Deserialize)]
pub struct GsiRound {
    /// "freezetime", "live" or "over"
    #[serde(default)]
    pub phase: Option<String>,
}

/// Player block
#[derive(Debug, Clone, Deserialize)]
pub struct GsiPlayer {
    /// "playing", "menu", "textinput"
    #[serde(default)]
    pub activity: Option<String>,

    #[serde(default)]
    pub state: Option<GsiPlayerState>,

    /// Weapon slots keyed "weapon_0", "weapon_1", ...
    #[serde(default)]
    pub weapons: HashMap<String, GsiWeapon>,
}

/// Health block
#[derive(Debug, Clone, Deserialize)]
pub struct GsiPlayerState {
    #[serde(default)]
    pub health: i32,
}

/// One weapon slot
#[derive(Debug, Clone, Deserialize)]
pub struct GsiWeapon {
    pub name: String,

    /// "active", "holstered" or "reloading"
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub ammo_clip: Option<i32>,
}

impl GsiPlayer {
    /// The weapon currently in the player's hands
    pub fn active_weapon(&self) -> Option<&GsiWeapon> {
        self.weapons
            .values()
            .find(|w| w.state.as_deref() == Some("active"))
    }
}
