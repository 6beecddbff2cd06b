//! Control surface: process-wide toggles and hotkey mapping
//!
//! The flags are owned here and passed by `Arc` into every component at
//! construction; all reads and writes go through the accessors. The OS-level
//! global key hook is an external collaborator that forwards key identifiers
//! into [`ControlSurface::handle_key`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};

/// Process-wide enable/disable state, read on hot paths without allocation
#[derive(Debug)]
pub struct ControlFlags {
    recoil_enabled: AtomicBool,
    detection_enabled: AtomicBool,
}

impl ControlFlags {
    pub fn new(recoil_enabled: bool, detection_enabled: bool) -> Self {
        Self {
            recoil_enabled: AtomicBool::new(recoil_enabled),
            detection_enabled: AtomicBool::new(detection_enabled),
        }
    }

    pub fn recoil_enabled(&self) -> bool {
        self.recoil_enabled.load(Ordering::Acquire)
    }

    pub fn detection_enabled(&self) -> bool {
        self.detection_enabled.load(Ordering::Acquire)
    }

    pub fn set_recoil_enabled(&self, enabled: bool) {
        self.recoil_enabled.store(enabled, Ordering::Release);
    }

    pub fn set_detection_enabled(&self, enabled: bool) {
        self.detection_enabled.store(enabled, Ordering::Release);
    }

    /// Flip compensation, returning the new value
    pub fn toggle_recoil(&self) -> bool {
        !self.recoil_enabled.fetch_xor(true, Ordering::AcqRel)
    }

    /// Flip detection, returning the new value
    pub fn toggle_detection(&self) -> bool {
        !self.detection_enabled.fetch_xor(true, Ordering::AcqRel)
    }
}

/// Action resolved from a key chord
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    Exit,
    ToggleRecoil,
    ToggleDetection,
    SelectWeapon(String),
}

/// Flag changes forwarded to the detector so a toggle takes effect without
/// waiting for the next telemetry update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    RecoilToggled(bool),
    DetectionToggled(bool),
    SelectWeapon(String),
}

/// Key bindings loaded from the external keymap document
#[derive(Debug, Clone, Deserialize)]
pub struct HotkeyMap {
    pub exit: String,
    pub toggle_recoil: String,
    pub toggle_detection: String,
    /// Key identifier -> weapon id for manual selection
    #[serde(default)]
    pub weapon_select: HashMap<String, String>,
}

impl HotkeyMap {
    /// Load the keymap document from disk
    pub fn from_file(path: &Path) -> Result<Self, KeymapError> {
        let raw = std::fs::read_to_string(path).map_err(|source| KeymapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let map: Self = serde_json::from_str(&raw).map_err(|source| KeymapError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(map)
    }

    /// Resolve a key identifier (case-insensitive) to its bound action
    pub fn resolve(&self, key: &str) -> Option<ControlAction> {
        let key = key.to_ascii_lowercase();
        if key == self.exit.to_ascii_lowercase() {
            return Some(ControlAction::Exit);
        }
        if key == self.toggle_recoil.to_ascii_lowercase() {
            return Some(ControlAction::ToggleRecoil);
        }
        if key == self.toggle_detection.to_ascii_lowercase() {
            return Some(ControlAction::ToggleDetection);
        }
        self.weapon_select
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
            .map(|(_, weapon)| ControlAction::SelectWeapon(weapon.clone()))
    }

    /// Weapon ids bound in the map but unknown to the store; reported, not fatal
    pub fn unknown_weapons<'a>(
        &'a self,
        known: impl Fn(&str) -> bool + 'a,
    ) -> impl Iterator<Item = &'a str> {
        self.weapon_select
            .values()
            .map(String::as_str)
            .filter(move |id| !known(id))
    }
}

/// Keymap document errors
#[derive(Debug, thiserror::Error)]
pub enum KeymapError {
    #[error("failed to read keymap {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse keymap {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },
}

/// Applies resolved actions: mutates the flags, forwards a [`ControlEvent`]
/// to the detector, and trips the exit notifier
pub struct ControlSurface {
    flags: Arc<ControlFlags>,
    keymap: HotkeyMap,
    detector_tx: mpsc::Sender<ControlEvent>,
    exit: Arc<Notify>,
}

impl ControlSurface {
    pub fn new(
        flags: Arc<ControlFlags>,
        keymap: HotkeyMap,
        detector_tx: mpsc::Sender<ControlEvent>,
    ) -> Self {
        Self {
            flags,
            keymap,
            detector_tx,
            exit: Arc::new(Notify::new()),
        }
    }

    /// Notifier tripped by the exit binding
    pub fn exit_handle(&self) -> Arc<Notify> {
        self.exit.clone()
    }

    /// Handle one key press from the hotkey collaborator.
    ///
    /// Returns the action taken, or `None` for an unbound key. Forwarding to
    /// the detector is non-blocking; a full channel loses the nudge but the
    /// flag itself is already set and is polled at every decision point.
    pub fn handle_key(&self, key: &str) -> Option<ControlAction> {
        let action = self.keymap.resolve(key)?;
        self.apply(action.clone());
        Some(action)
    }

    /// Apply an action directly (UI collaborators bypass the keymap)
    pub fn apply(&self, action: ControlAction) {
        match &action {
            ControlAction::Exit => {
                info!("exit requested via control surface");
                self.exit.notify_waiters();
            }
            ControlAction::ToggleRecoil => {
                let enabled = self.flags.toggle_recoil();
                info!(enabled, "compensation toggled");
                self.forward(ControlEvent::RecoilToggled(enabled));
            }
            ControlAction::ToggleDetection => {
                let enabled = self.flags.toggle_detection();
                info!(enabled, "weapon detection toggled");
                self.forward(ControlEvent::DetectionToggled(enabled));
            }
            ControlAction::SelectWeapon(weapon) => {
                info!(weapon = %weapon, "manual weapon selection");
                self.forward(ControlEvent::SelectWeapon(weapon.clone()));
            }
        }
    }

    fn forward(&self, event: ControlEvent) {
        if let Err(e) = self.detector_tx.try_send(event) {
            warn!(error = %e, "control event not delivered to detector");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keymap() -> HotkeyMap {
        HotkeyMap {
            exit: "f12".to_string(),
            toggle_recoil: "f2".to_string(),
            toggle_detection: "f3".to_string(),
            weapon_select: HashMap::from([
                ("f5".to_string(), "ak47".to_string()),
                ("f6".to_string(), "m4a4".to_string()),
            ]),
        }
    }

    #[test]
    fn toggle_flips_and_reports_new_value() {
        let flags = ControlFlags::new(true, false);
        assert!(!flags.toggle_recoil());
        assert!(!flags.recoil_enabled());
        assert!(flags.toggle_detection());
        assert!(flags.detection_enabled());
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let map = keymap();
        assert_eq!(map.resolve("F2"), Some(ControlAction::ToggleRecoil));
        assert_eq!(map.resolve("f12"), Some(ControlAction::Exit));
        assert_eq!(
            map.resolve("F5"),
            Some(ControlAction::SelectWeapon("ak47".to_string()))
        );
        assert_eq!(map.resolve("f9"), None);
    }

    #[test]
    fn unknown_weapons_are_reported() {
        let map = keymap();
        let unknown: Vec<&str> = map.unknown_weapons(|id| id == "ak47").collect();
        assert_eq!(unknown, vec!["m4a4"]);
    }

    #[tokio::test]
    async fn handle_key_updates_flags_and_forwards_event() {
        let flags = Arc::new(ControlFlags::new(true, true));
        let (tx, mut rx) = mpsc::channel(8);
        let surface = ControlSurface::new(flags.clone(), keymap(), tx);

        assert_eq!(surface.handle_key("f2"), Some(ControlAction::ToggleRecoil));
        assert!(!flags.recoil_enabled());
        assert_eq!(rx.recv().await, Some(ControlEvent::RecoilToggled(false)));

        assert_eq!(
            surface.handle_key("f5"),
            Some(ControlAction::SelectWeapon("ak47".to_string()))
        );
        assert_eq!(
            rx.recv().await,
            Some(ControlEvent::SelectWeapon("ak47".to_string()))
        );
    }

    #[tokio::test]
    async fn exit_key_trips_the_notifier() {
        let flags = Arc::new(ControlFlags::new(true, true));
        let (tx, _rx) = mpsc::channel(8);
        let surface = ControlSurface::new(flags, keymap(), tx);
        let exit = surface.exit_handle();

        let waiter = tokio::spawn(async move { exit.notified().await });
        tokio::task::yield_now().await;
        surface.handle_key("f12");
        waiter.await.unwrap();
    }
}
