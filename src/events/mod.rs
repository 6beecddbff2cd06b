//! Engine event fan-out
//!
//! Status events for UI, audio and logging collaborators. Publishing goes
//! through a broadcast channel and never waits on a subscriber; a lagged
//! receiver loses the oldest events, not the publisher's time.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Default buffer depth per subscriber
const BUS_CAPACITY: usize = 64;

/// Events emitted by the detector and compensation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A supported weapon became the active weapon
    WeaponActivated {
        weapon: String,
        display_name: String,
    },

    /// No weapon is armed anymore (weapon lost, or detection/compensation disabled)
    WeaponDeactivated,

    /// Sustained fire began on the armed weapon
    FireStarted {
        weapon: String,
    },

    /// Fire ended
    FireStopped,

    /// Clip crossed the low-ammo threshold (state unchanged)
    LowAmmo {
        weapon: String,
        ammo_clip: u16,
    },

    /// A compensation session aborted after repeated injection failures
    EngineFault {
        session: Uuid,
        reason: String,
    },
}

/// One-to-many publish point for [`EngineEvent`]
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Best-effort: with no subscribers the event is dropped, and a slow
    /// subscriber lags rather than stalling the publisher.
    pub fn publish(&self, event: EngineEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!(?event, "event published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
