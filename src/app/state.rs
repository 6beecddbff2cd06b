//! Application state shared across components

use std::sync::Arc;

use crate::config::Config;
use crate::control::ControlFlags;
use crate::detect::{self, DetectionView};
use crate::events::EventBus;
use crate::patterns::PatternStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<PatternStore>,
    pub flags: Arc<ControlFlags>,
    pub bus: EventBus,
    pub detection: DetectionView,
}

impl AppState {
    pub fn new(config: Config, store: PatternStore) -> Self {
        let flags = Arc::new(ControlFlags::new(
            config.recoil_enabled,
            config.detection_enabled,
        ));

        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            flags,
            bus: EventBus::new(),
            detection: detect::new_view(),
        }
    }
}
