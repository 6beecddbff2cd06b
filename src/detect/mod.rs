//! Weapon detection: state machine and decision task

pub mod detector;

pub use detector::{EngineCommand, WeaponDetector};

use std::sync::Arc;

use parking_lot::RwLock;

/// Detection outcome, owned exclusively by the detector task.
///
/// Everyone else holds the [`DetectionView`] and reads it; single writer,
/// many readers.
#[derive(Debug, Clone, Default)]
pub struct DetectionState {
    /// Weapon id of the armed weapon, if any
    pub current_weapon: Option<String>,
    pub firing: bool,
    /// Unix millis of the last state transition
    pub last_transition_at: u64,
}

/// Shared read view of [`DetectionState`]
pub type DetectionView = Arc<RwLock<DetectionState>>;

pub fn new_view() -> DetectionView {
    Arc::new(RwLock::new(DetectionState::default()))
}
