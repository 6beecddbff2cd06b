//! Compensation session
//!
//! One session per burst of fire: a cursor over the weapon's resolved
//! pattern plus the jitter state. Each step is computed from the pattern
//! alone; rounding errors are not carried between steps, so drift stays
//! bounded by one pattern's total displacement. Jitter is sampled fresh per
//! step and never compounds.

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;
use uuid::Uuid;

use crate::patterns::WeaponProfile;

/// One emitted step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEmit {
    pub index: usize,
    pub dx: i32,
    pub dy: i32,
}

/// Ephemeral state of one compensation run, exclusively owned by the engine
pub struct CompensationSession {
    pub id: Uuid,
    weapon: Arc<WeaponProfile>,
    index: usize,
    pub started_at: Instant,
    rng: ChaCha8Rng,
}

impl CompensationSession {
    pub fn new(weapon: Arc<WeaponProfile>) -> Self {
        Self::with_rng(weapon, ChaCha8Rng::from_entropy())
    }

    /// Deterministic jitter stream
    #[cfg(test)]
    pub fn with_seed(weapon: Arc<WeaponProfile>, seed: u64) -> Self {
        Self::with_rng(weapon, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(weapon: Arc<WeaponProfile>, rng: ChaCha8Rng) -> Self {
        Self {
            id: Uuid::new_v4(),
            weapon,
            index: 0,
            started_at: Instant::now(),
            rng,
        }
    }

    pub fn weapon(&self) -> &Arc<WeaponProfile> {
        &self.weapon
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Past the last pattern step: no further compensation is emitted
    pub fn exhausted(&self) -> bool {
        self.index >= self.weapon.resolved_pattern().len()
    }

    /// Pointer delta for the current step: pattern offset scaled by the
    /// weapon multiplier, jittered, independently rounded. `None` once the
    /// pattern is exhausted.
    pub fn emit(&mut self) -> Option<StepEmit> {
        let step = self.weapon.resolved_pattern().get(self.index)?;

        let mut factor = self.weapon.multiplier;
        let jitter_pct = self.weapon.jitter_movement_pct;
        if jitter_pct > 0.0 {
            factor *= 1.0 + self.rng.gen_range(-jitter_pct..=jitter_pct) / 100.0;
        }

        Some(StepEmit {
            index: self.index,
            dx: (step.dx * factor).round() as i32,
            dy: (step.dy * factor).round() as i32,
        })
    }

    /// Jittered wait after the current step, clamped at zero.
    ///
    /// `None` once the pattern is exhausted.
    pub fn step_wait(&mut self) -> Option<Duration> {
        let step = self.weapon.resolved_pattern().get(self.index)?;

        let mut interval_ms = self.weapon.scaled_interval_ms(step);
        let jitter_ms = self.weapon.jitter_timing_ms;
        if jitter_ms > 0.0 {
            interval_ms += self.rng.gen_range(-jitter_ms..=jitter_ms);
        }

        Some(Duration::from_secs_f64(interval_ms.max(0.0) / 1000.0))
    }

    pub fn advance(&mut self) {
        self.index += 1;
    }
}
