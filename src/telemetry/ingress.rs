//! Telemetry listener
//!
//! A local HTTP endpoint the game pushes state updates to. Updates are
//! normalized and published through a coalescing slot of depth one: the
//! detector always sees the newest snapshot, intermediate ones are
//! intentionally lost. The route surface also carries the health/status
//! document and a control entry point for UI collaborators.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::control::{ControlAction, ControlFlags, ControlSurface};
use crate::detect::DetectionView;
use crate::patterns::PatternStore;
use crate::telemetry::{GameState, Normalizer};
use crate::util::log_limit::LogLimiter;
use crate::util::time::{unix_millis, uptime_secs};

/// The feed is considered connected while updates keep arriving
const CONNECTED_WINDOW_MS: u64 = 5_000;

/// Telemetry listener failed to acquire its endpoint
#[derive(Debug, thiserror::Error)]
#[error("telemetry listener could not bind {addr}: {source}")]
pub struct BindError {
    pub addr: SocketAddr,
    #[source]
    pub source: std::io::Error,
}

/// Outcome of one inbound update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Meaningful change, published to the slot
    Published,
    /// Same observation as the current slot value; not re-published
    Duplicate,
    /// No player block; update dropped
    Dropped,
}

/// Shared state behind the telemetry routes
pub struct IngressState {
    normalizer: Mutex<Normalizer>,
    state_tx: watch::Sender<Option<GameState>>,
    warn_limiter: LogLimiter,
    last_update_ms: AtomicU64,
    flags: Arc<ControlFlags>,
    detection: DetectionView,
    store: Arc<PatternStore>,
    surface: Arc<ControlSurface>,
}

impl IngressState {
    /// Build the listener state and the snapshot slot consumer side
    pub fn new(
        flags: Arc<ControlFlags>,
        detection: DetectionView,
        store: Arc<PatternStore>,
        surface: Arc<ControlSurface>,
    ) -> (Arc<Self>, watch::Receiver<Option<GameState>>) {
        let (state_tx, state_rx) = watch::channel(None);
        let state = Arc::new(Self {
            normalizer: Mutex::new(Normalizer::new()),
            state_tx,
            warn_limiter: LogLimiter::default(),
            last_update_ms: AtomicU64::new(0),
            flags,
            detection,
            store,
            surface,
        });
        (state, state_rx)
    }

    /// Normalize one payload and publish it if it carries a meaningful change
    pub fn accept(&self, payload: &crate::telemetry::schema::GsiPayload) -> Accepted {
        self.last_update_ms.store(unix_millis(), Ordering::Relaxed);

        let snapshot = match self.normalizer.lock().normalize(payload) {
            Some(snapshot) => snapshot,
            None => {
                if self.warn_limiter.allow() {
                    warn!("telemetry update without player block dropped");
                }
                return Accepted::Dropped;
            }
        };

        let duplicate = self
            .state_tx
            .borrow()
            .as_ref()
            .map(|prev| prev.same_observation(&snapshot))
            .unwrap_or(false);
        if duplicate {
            return Accepted::Duplicate;
        }

        debug!(
            weapon = snapshot.active_weapon.as_deref().unwrap_or("-"),
            firing = snapshot.is_firing,
            received_at = snapshot.received_at,
            "snapshot published"
        );
        // Replace, never queue: the consumer only ever wants the newest state
        self.state_tx.send_replace(Some(snapshot));
        Accepted::Published
    }
}

/// Build the listener router
pub fn build_router(state: Arc<IngressState>) -> Router {
    Router::new()
        .route("/", post(gsi_handler))
        .route("/health", get(health_handler))
        .route("/control", post(control_handler))
        .layer(TimeoutLayer::new(Duration::from_secs(5)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the endpoint and serve until the shutdown future resolves
pub async fn start(
    addr: SocketAddr,
    state: Arc<IngressState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BindError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| BindError { addr, source })?;

    info!("telemetry listener on http://{}", addr);

    let router = build_router(state);
    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
    {
        warn!(error = %e, "telemetry listener terminated with error");
    }

    info!("telemetry listener stopped");
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn gsi_handler(
    State(state): State<Arc<IngressState>>,
    payload: Result<Json<crate::telemetry::schema::GsiPayload>, JsonRejection>,
) -> StatusCode {
    match payload {
        Ok(Json(payload)) => {
            state.accept(&payload);
            // The sender ignores the response body; status is all that matters
            StatusCode::OK
        }
        Err(rejection) => {
            if state.warn_limiter.allow() {
                warn!(error = %rejection, "malformed telemetry payload dropped");
            }
            StatusCode::BAD_REQUEST
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    telemetry: &'static str,
    last_update: Option<String>,
    recoil_enabled: bool,
    detection_enabled: bool,
    active_weapon: Option<String>,
    firing: bool,
    /// Unix millis of the detector's last state transition
    last_transition_at: u64,
    weapons_loaded: usize,
}

async fn health_handler(State(state): State<Arc<IngressState>>) -> Json<HealthResponse> {
    let last_ms = state.last_update_ms.load(Ordering::Relaxed);
    let telemetry = if last_ms == 0 {
        "listening"
    } else if unix_millis().saturating_sub(last_ms) < CONNECTED_WINDOW_MS {
        "connected"
    } else {
        "stale"
    };

    let last_update = (last_ms > 0)
        .then(|| chrono::DateTime::from_timestamp_millis(last_ms as i64))
        .flatten()
        .map(|t| t.to_rfc3339());

    let detection = state.detection.read();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        telemetry,
        last_update,
        recoil_enabled: state.flags.recoil_enabled(),
        detection_enabled: state.flags.detection_enabled(),
        active_weapon: detection.current_weapon.clone(),
        firing: detection.firing,
        last_transition_at: detection.last_transition_at,
        weapons_loaded: state.store.len(),
    })
}

#[derive(Deserialize)]
struct ControlRequest {
    key: String,
}

#[derive(Serialize)]
struct ControlResponse {
    action: Option<&'static str>,
    weapon: Option<String>,
}

/// UI-side control entry point: resolves a key chord exactly like the global
/// hotkey collaborator would
async fn control_handler(
    State(state): State<Arc<IngressState>>,
    Json(req): Json<ControlRequest>,
) -> Json<ControlResponse> {
    let action = state.surface.handle_key(&req.key);
    let (name, weapon) = match action {
        Some(ControlAction::Exit) => (Some("exit"), None),
        Some(ControlAction::ToggleRecoil) => (Some("toggle_recoil"), None),
        Some(ControlAction::ToggleDetection) => (Some("toggle_detection"), None),
        Some(ControlAction::SelectWeapon(w)) => (Some("select_weapon"), Some(w)),
        None => (None, None),
    };
    Json(ControlResponse {
        action: name,
        weapon,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::HotkeyMap;
    use crate::patterns::{PatternStore, WeaponsDocument};
    use tokio::sync::mpsc;

    fn ingress() -> (Arc<IngressState>, watch::Receiver<Option<GameState>>) {
        let flags = Arc::new(ControlFlags::new(true, true));
        let (store, _) = PatternStore::load(
            WeaponsDocument { weapons: vec![] },
            std::path::Path::new("/nonexistent"),
            1.0,
        );
        let (control_tx, _control_rx) = mpsc::channel(8);
        let surface = Arc::new(ControlSurface::new(
            flags.clone(),
            HotkeyMap {
                exit: "f12".into(),
                toggle_recoil: "f2".into(),
                toggle_detection: "f3".into(),
                weapon_select: Default::default(),
            },
            control_tx,
        ));
        IngressState::new(flags, crate::detect::new_view(), Arc::new(store), surface)
    }

    fn payload(weapon: &str, ammo: i32) -> crate::telemetry::schema::GsiPayload {
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

    #[tokio::test]
    async fn burst_of_updates_coalesces_to_the_newest() {
        let (state, rx) = ingress();

        assert_eq!(state.accept(&payload("weapon_ak47", 30)), Accepted::Published);
        assert_eq!(state.accept(&payload("weapon_ak47", 29)), Accepted::Published);
        assert_eq!(state.accept(&payload("weapon_ak47", 27)), Accepted::Published);

        // The consumer has not read anything yet; it must observe only the last
        let seen = rx.borrow().clone().unwrap();
        assert_eq!(seen.ammo_clip, Some(27));
        assert!(seen.is_firing);
    }

    #[tokio::test]
    async fn duplicate_observation_is_not_republished() {
        let (state, mut rx) = ingress();

        assert_eq!(state.accept(&payload("weapon_ak47", 30)), Accepted::Published);
        rx.borrow_and_update();

        assert_eq!(state.accept(&payload("weapon_ak47", 30)), Accepted::Duplicate);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn update_without_player_is_dropped() {
        let (state, rx) = ingress();
        let empty: crate::telemetry::schema::GsiPayload =
            serde_json::from_str(r#"{ "round": { "phase": "live" } }"#).unwrap();

        assert_eq!(state.accept(&empty), Accepted::Dropped);
        assert!(!rx.has_changed().unwrap());
    }
}
