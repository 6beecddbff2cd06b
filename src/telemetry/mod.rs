//! Telemetry ingestion and normalization

pub mod ingress;
pub mod schema;

use crate::util::time::unix_millis;
use schema::GsiPayload;

/// Round phase as reported by the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Freezetime,
    Live,
    Over,
    Unknown,
}

impl RoundPhase {
    fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("freezetime") => Self::Freezetime,
            Some("live") => Self::Live,
            Some("over") => Self::Over,
            _ => Self::Unknown,
        }
    }
}

/// Normalized snapshot of the player/weapon/round state.
///
/// Constructed per accepted update, consumed by the detector, then discarded;
/// only the newest snapshot is ever retained.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    /// Telemetry name of the weapon in hand (e.g. "weapon_ak47")
    pub active_weapon: Option<String>,
    /// Rounds left in the clip of the active weapon
    pub ammo_clip: Option<u16>,
    /// Derived: ammo in the same clip strictly decreased since the last update
    pub is_firing: bool,
    pub round_phase: RoundPhase,
    /// Alive and in active gameplay
    pub combat_ready: bool,
    /// Unix millis at normalization time
    pub received_at: u64,
}

impl GameState {
    /// Field equality ignoring the receive timestamp; duplicate observations
    /// are filtered out before publication.
    pub fn same_observation(&self, other: &GameState) -> bool {
        self.active_weapon == other.active_weapon
            && self.ammo_clip == other.ammo_clip
            && self.is_firing == other.is_firing
            && self.round_phase == other.round_phase
            && self.combat_ready == other.combat_ready
    }
}

/// Stateful payload-to-snapshot converter.
///
/// Keeps the previous weapon/ammo observation to derive the fire flag: a
/// strict ammo decrease in the same weapon's clip means the trigger is down;
/// a weapon change, a reload (ammo increase) or loss of combat readiness
/// clears it. An empty clip can no longer fire.
#[derive(Debug, Default)]
pub struct Normalizer {
    last_seen: Option<(String, u16)>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a payload into a snapshot; `None` when the update carries no
    /// player block and must be dropped.
    pub fn normalize(&mut self, payload: &GsiPayload) -> Option<GameState> {
        let player = payload.player.as_ref()?;

        let round_phase = RoundPhase::parse(
            payload
                .round
                .as_ref()
                .and_then(|r| r.phase.as_deref()),
        );

        let alive = player.state.as_ref().map(|s| s.health > 0).unwrap_or(false);
        let playing = player.activity.as_deref() == Some("playing");
        let combat_ready = alive && playing && round_phase == RoundPhase::Live;

        let active = player.active_weapon();
        let active_weapon = active.map(|w| w.name.clone());
        let ammo_clip = active
            .and_then(|w| w.ammo_clip)
            .map(|a| a.max(0) as u16);

        let is_firing = match (&active_weapon, ammo_clip, &self.last_seen) {
            (Some(weapon), Some(ammo), Some((last_weapon, last_ammo))) => {
                combat_ready && ammo > 0 && weapon == last_weapon && ammo < *last_ammo
            }
            _ => false,
        };

        self.last_seen = match (&active_weapon, ammo_clip) {
            (Some(weapon), Some(ammo)) => Some((weapon.clone(), ammo)),
            _ => None,
        };

        Some(GameState {
            active_weapon,
            ammo_clip,
            is_firing,
            round_phase,
            combat_ready,
            received_at: unix_millis(),
        })
    }
}
