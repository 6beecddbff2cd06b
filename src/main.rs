//! Recoil compensation engine
//!
//! Ingests live game telemetry over a local push endpoint, derives the held
//! weapon and fire state, and drives precisely-timed synthetic pointer
//! movements against the weapon's recoil pattern. The graphical interface,
//! audio feedback and the real pointer injector are external collaborators:
//! they consume the event bus and provide the `PointerDriver` capability.

mod app;
mod config;
mod control;
mod detect;
mod engine;
mod events;
mod patterns;
mod telemetry;
mod util;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::control::{ControlSurface, HotkeyMap};
use crate::detect::WeaponDetector;
use crate::engine::{CompensationEngine, TracingPointerDriver};
use crate::patterns::{PatternStore, WeaponsDocument};
use crate::telemetry::ingress::{self, IngressState};
use crate::util::time::init_process_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize process time tracking
    init_process_time();

    info!("Starting recoil compensation engine");
    info!("Telemetry address: {}", config.server_addr);

    // Load weapon parameters and patterns; a bad entry costs that weapon only
    let document = WeaponsDocument::from_file(&config.weapons_file)?;
    let (store, failures) =
        PatternStore::load(document, &config.patterns_dir, config.game_sensitivity);
    for failure in &failures {
        warn!(error = %failure, "weapon skipped");
    }

    let keymap = HotkeyMap::from_file(&config.keymap_file)?;

    // Create application state
    let state = AppState::new(config, store);

    if state.store.is_empty() {
        warn!("pattern store is empty; detection will never arm a weapon");
    }

    let unbound: Vec<String> = keymap
        .unknown_weapons(|id| state.store.contains(id))
        .map(str::to_string)
        .collect();
    for weapon in unbound {
        warn!(weapon = %weapon, "keymap references a weapon without a profile");
    }

    // Detector -> engine command channel, control surface -> detector channel
    let (engine_tx, engine_rx) = mpsc::channel(32);
    let (control_tx, control_rx) = mpsc::channel(8);

    let surface = Arc::new(ControlSurface::new(state.flags.clone(), keymap, control_tx));
    let exit = surface.exit_handle();

    let (ingress_state, snapshot_rx) = IngressState::new(
        state.flags.clone(),
        state.detection.clone(),
        state.store.clone(),
        surface,
    );

    // Spawn the detection task
    let detector = WeaponDetector::new(
        state.store.clone(),
        state.flags.clone(),
        state.bus.clone(),
        state.detection.clone(),
        engine_tx,
        Duration::from_millis(state.config.dwell_ms),
        Duration::from_millis(state.config.fire_decay_ms),
        state.config.low_ammo_threshold,
    );
    let detector_task = tokio::spawn(detector.run(snapshot_rx, control_rx));

    // Spawn the compensation engine. The dry-run pointer driver logs deltas;
    // the hosting platform's injector replaces it at integration time.
    let engine = CompensationEngine::new(
        state.store.clone(),
        state.flags.clone(),
        state.bus.clone(),
        Arc::new(TracingPointerDriver),
        engine_rx,
    );
    let engine_task = tokio::spawn(engine.run());

    // Logging collaborator on the event bus
    let mut event_log = state.bus.subscribe();
    tokio::spawn(async move {
        loop {
            match event_log.recv().await {
                Ok(event) => info!(?event, "engine event"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged = n, "event log fell behind")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let addr = state.config.server_addr;
    info!("Health check: http://{}/health", addr);

    ingress::start(addr, ingress_state, shutdown_signal(exit)).await?;

    // Toggles cleared so any live session terminates while the tasks drain;
    // the router owned the snapshot slot, so with it gone the detector and
    // the engine wind down through channel closure
    state.flags.set_recoil_enabled(false);
    state.flags.set_detection_enabled(false);
    let _ = detector_task.await;
    let _ = engine_task.await;

    info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal(exit: Arc<Notify>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
        _ = exit.notified() => {
            info!("Exit hotkey pressed, starting graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlFlags;
    use crate::engine::{InjectionError, PointerDriver};
    use crate::events::EngineEvent;
    use crate::patterns::WeaponsDocument;
    use crate::telemetry::ingress::IngressState;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct RecordingDriver {
        moves: Mutex<Vec<(i32, i32, Instant)>>,
    }

    impl PointerDriver for RecordingDriver {
        fn move_by(&self, dx: i32, dy: i32) -> Result<(), InjectionError> {
            self.moves.lock().push((dx, dy, Instant::now()));
            Ok(())
        }
    }

    fn payload(weapon: &str, ammo: i32) -> telemetry::schema::GsiPayload {
        serde_json::from_str(&format!(
            r#"{{
                "round": {{ "phase": "live" }},
                "player": {{
                    "activity": "playing",
                    "state": {{ "health": 100 }},
                    "weapons": {{
                        "weapon_1": {{ "name": "{weapon}", "state": "active", "ammo_clip": {ammo} }}
                    }}
                }}
            }}"#
        ))
        .unwrap()
    }

    /// Telemetry in, pointer deltas out: the full pipeline on a paused clock
    #[tokio::test(start_paused = true)]
    async fn telemetry_drives_timed_compensation_end_to_end() {
        let dir = std::env::temp_dir().join(format!("rcs-e2e-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("m4a4.csv"), "0,0,100\n1,4,100\n2,6,100\n").unwrap();
        let document: WeaponsDocument = serde_json::from_str(
            r#"{ "weapons": [
                { "id": "m4a4", "telemetry_names": ["weapon_m4a4"], "length": 3 }
            ] }"#,
        )
        .unwrap();
        let (store, failures) = PatternStore::load(document, &dir, 2.45);
        assert!(failures.is_empty());

        let flags = Arc::new(ControlFlags::new(true, true));
        let bus = crate::events::EventBus::new();
        let mut events = bus.subscribe();
        let view = crate::detect::new_view();
        let store = Arc::new(store);
        let driver = Arc::new(RecordingDriver::default());

        let (engine_tx, engine_rx) = mpsc::channel(32);
        let (_control_tx, control_rx) = mpsc::channel(8);

        let (ingress_state, snapshot_rx) = IngressState::new(
            flags.clone(),
            view.clone(),
            store.clone(),
            Arc::new(ControlSurface::new(
                flags.clone(),
                control::HotkeyMap {
                    exit: "f12".into(),
                    toggle_recoil: "f2".into(),
                    toggle_detection: "f3".into(),
                    weapon_select: Default::default(),
                },
                _control_tx.clone(),
            )),
        );

        let detector = WeaponDetector::new(
            store.clone(),
            flags.clone(),
            bus.clone(),
            view.clone(),
            engine_tx,
            Duration::from_millis(150),
            Duration::from_secs(10),
            5,
        );
        tokio::spawn(detector.run(snapshot_rx, control_rx));

        let engine = CompensationEngine::new(
            store.clone(),
            flags.clone(),
            bus.clone(),
            driver.clone(),
            engine_rx,
        );
        tokio::spawn(engine.run());

        // Weapon in hand: the detector arms it
        ingress_state.accept(&payload("weapon_m4a4", 30));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(view.read().current_weapon.as_deref(), Some("m4a4"));
        assert!(matches!(
            events.recv().await.unwrap(),
            EngineEvent::WeaponActivated { ref weapon, .. } if weapon == "m4a4"
        ));

        // Ammo drops: fire begins, the engine steps the pattern
        let t_fire = Instant::now();
        ingress_state.accept(&payload("weapon_m4a4", 29));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(matches!(
            events.recv().await.unwrap(),
            EngineEvent::FireStarted { ref weapon } if weapon == "m4a4"
        ));

        // Trigger released mid-pattern: no further emissions
        ingress_state.accept(&payload("weapon_m4a4", 29));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(events.recv().await.unwrap(), EngineEvent::FireStopped);

        let moves = driver.moves.lock().clone();
        assert_eq!(moves.len(), 2, "step 0 is zero, steps 1 and 2 are emitted");
        assert_eq!((moves[0].0, moves[0].1), (1, 4));
        assert_eq!(moves[0].2.duration_since(t_fire), Duration::from_millis(100));
        assert_eq!((moves[1].0, moves[1].1), (2, 6));
        assert_eq!(moves[1].2.duration_since(t_fire), Duration::from_millis(200));
        assert!(!view.read().firing);
    }
}
