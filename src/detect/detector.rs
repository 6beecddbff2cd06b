//! Weapon detection state machine
//!
//! Consumes normalized snapshots and decides which weapon is armed and
//! whether fire is in progress. The decision core (`DetectorMachine`) is
//! synchronous and owns all transition rules; the surrounding task wires it
//! to the snapshot slot, the control channel and the dwell/decay timers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::control::{ControlEvent, ControlFlags};
use crate::events::{EngineEvent, EventBus};
use crate::patterns::{PatternStore, WeaponProfile};
use crate::telemetry::GameState;
use crate::util::time::unix_millis;

use super::DetectionView;

/// Commands driving the compensation engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// Begin a compensation session for the armed weapon
    StartFire { weapon: String },
    /// End the live session
    StopFire,
    /// The armed weapon changed; tear the live session down
    WeaponChanged,
}

/// Wake-up cadence when no dwell or decay deadline is pending
const IDLE_WAKE: Duration = Duration::from_secs(60);

/// Detector phase
#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Armed(String),
    Firing(String),
}

impl Phase {
    fn weapon(&self) -> Option<&str> {
        match self {
            Phase::Idle => None,
            Phase::Armed(w) | Phase::Firing(w) => Some(w),
        }
    }
}

/// A weapon switch waiting out the dwell guard
#[derive(Debug, Clone)]
struct PendingSwitch {
    weapon: String,
    display_name: String,
    since: Instant,
}

/// Output of one decision step
#[derive(Debug, Default)]
pub(crate) struct Decision {
    pub events: Vec<EngineEvent>,
    pub commands: Vec<EngineCommand>,
    /// A phase transition happened (LowAmmo alone does not count)
    pub transition: bool,
}

impl Decision {
    fn is_empty(&self) -> bool {
        self.events.is_empty() && self.commands.is_empty()
    }
}

/// Synchronous transition rules, exclusively owned by the detector task
pub(crate) struct DetectorMachine {
    phase: Phase,
    pending: Option<PendingSwitch>,
    /// Last weapon id the feed resolved to (None when unsupported or not ready)
    last_target: Option<String>,
    /// Most recent snapshot that carried fire evidence
    last_fire_evidence: Option<Instant>,
    low_ammo_latched: bool,
    dwell: Duration,
    fire_decay: Duration,
    low_ammo_threshold: u16,
}

impl DetectorMachine {
    pub fn new(dwell: Duration, fire_decay: Duration, low_ammo_threshold: u16) -> Self {
        Self {
            phase: Phase::Idle,
            pending: None,
            last_target: None,
            last_fire_evidence: None,
            low_ammo_latched: false,
            dwell,
            fire_decay,
            low_ammo_threshold,
        }
    }

    pub fn current_weapon(&self) -> Option<&str> {
        self.phase.weapon()
    }

    pub fn is_firing(&self) -> bool {
        matches!(self.phase, Phase::Firing(_))
    }

    /// Next instant at which [`tick`](Self::tick) has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        let dwell = self.pending.as_ref().map(|p| p.since + self.dwell);
        let decay = match (&self.phase, self.pending.is_none(), self.last_fire_evidence) {
            (Phase::Firing(_), true, Some(at)) => Some(at + self.fire_decay),
            _ => None,
        };
        match (dwell, decay) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }

    /// Process a freshly arrived snapshot
    pub fn observe(
        &mut self,
        snap: &GameState,
        profile: Option<&Arc<WeaponProfile>>,
        now: Instant,
    ) -> Decision {
        let mut d = Decision::default();

        let target = if snap.combat_ready {
            profile.map(|p| p.id.as_str())
        } else {
            None
        };
        self.last_target = target.map(str::to_string);

        let changed = self.apply_weapon_change(target, profile, now, &mut d);

        // Tie-break: on the tick a weapon change takes (or awaits) effect, the
        // fire state is re-evaluated against the new weapon on the next one.
        if !changed && self.pending.is_none() {
            self.apply_fire_state(snap, target, now, &mut d);
        }

        self.apply_ammo_watch(snap, profile, &mut d);

        d
    }

    /// Manual mode: the armed weapon is hand-picked, telemetry drives the
    /// fire state and ammo watch only
    pub fn observe_manual(
        &mut self,
        snap: &GameState,
        profile: Option<&Arc<WeaponProfile>>,
        now: Instant,
    ) -> Decision {
        let mut d = Decision::default();

        let target = if snap.combat_ready {
            profile.map(|p| p.id.as_str())
        } else {
            None
        };
        self.last_target = target.map(str::to_string);

        self.apply_fire_state(snap, target, now, &mut d);
        self.apply_ammo_watch(snap, profile, &mut d);

        d
    }

    /// Handle due deadlines: dwell commit and fire decay.
    ///
    /// Called without a new snapshot, so stale fire evidence is never
    /// refreshed here.
    pub fn tick(&mut self, now: Instant) -> Decision {
        let mut d = Decision::default();

        if let Some(pending) = self.pending.clone() {
            if now >= pending.since + self.dwell {
                if self.last_target.as_deref() == Some(pending.weapon.as_str()) {
                    self.commit_switch(pending, &mut d);
                } else {
                    // The candidate did not survive its own dwell
                    self.pending = None;
                }
            }
        }

        if self.pending.is_none() {
            if let (Phase::Firing(weapon), Some(evidence)) =
                (&self.phase, self.last_fire_evidence)
            {
                if now >= evidence + self.fire_decay {
                    let weapon = weapon.clone();
                    debug!(weapon = %weapon, "fire evidence decayed");
                    self.phase = Phase::Armed(weapon);
                    self.last_fire_evidence = None;
                    d.events.push(EngineEvent::FireStopped);
                    d.commands.push(EngineCommand::StopFire);
                    d.transition = true;
                }
            }
        }

        d
    }

    /// Detection or compensation disabled: drop to Idle from any state
    pub fn force_idle(&mut self) -> Decision {
        let mut d = Decision::default();
        if self.phase != Phase::Idle {
            if matches!(self.phase, Phase::Firing(_)) {
                d.commands.push(EngineCommand::StopFire);
            }
            self.phase = Phase::Idle;
            d.events.push(EngineEvent::WeaponDeactivated);
            d.transition = true;
        }
        self.pending = None;
        self.last_fire_evidence = None;
        self.low_ammo_latched = false;
        d
    }

    /// Arm a weapon directly, bypassing telemetry and the dwell guard
    pub fn manual_select(&mut self, profile: &WeaponProfile) -> Decision {
        let mut d = Decision::default();
        if self.phase.weapon() == Some(profile.id.as_str()) {
            return d;
        }
        if matches!(self.phase, Phase::Firing(_)) {
            d.commands.push(EngineCommand::WeaponChanged);
        }
        self.phase = Phase::Armed(profile.id.clone());
        self.pending = None;
        self.last_fire_evidence = None;
        d.events.push(EngineEvent::WeaponActivated {
            weapon: profile.id.clone(),
            display_name: profile.display_name.clone(),
        });
        d.transition = true;
        d
    }

    fn apply_weapon_change(
        &mut self,
        target: Option<&str>,
        profile: Option<&Arc<WeaponProfile>>,
        now: Instant,
        d: &mut Decision,
    ) -> bool {
        match (self.phase.weapon().map(str::to_string), target) {
            // First supported weapon arms immediately
            (None, Some(weapon)) => {
                let display_name = profile
                    .map(|p| p.display_name.clone())
                    .unwrap_or_else(|| weapon.to_string());
                self.phase = Phase::Armed(weapon.to_string());
                self.pending = None;
                d.events.push(EngineEvent::WeaponActivated {
                    weapon: weapon.to_string(),
                    display_name,
                });
                d.transition = true;
                true
            }

            // A different weapon must hold through the dwell window
            (Some(current), Some(weapon)) if current != weapon => {
                match self.pending.take() {
                    Some(p) if p.weapon == weapon => {
                        if now >= p.since + self.dwell {
                            self.commit_switch(p, d);
                            return true;
                        }
                        self.pending = Some(p);
                    }
                    _ => {
                        // New candidate restarts the dwell; a rapid burst of
                        // switches only makes the last one effective
                        self.pending = Some(PendingSwitch {
                            weapon: weapon.to_string(),
                            display_name: profile
                                .map(|p| p.display_name.clone())
                                .unwrap_or_else(|| weapon.to_string()),
                            since: now,
                        });
                    }
                }
                false
            }

            // Same weapon re-reported: cancel any pending switch
            (Some(_), Some(_)) => {
                self.pending = None;
                false
            }

            // Weapon lost (holstered, unsupported, not combat ready)
            (Some(_), None) => {
                if matches!(self.phase, Phase::Firing(_)) {
                    d.commands.push(EngineCommand::StopFire);
                }
                self.phase = Phase::Idle;
                self.pending = None;
                self.last_fire_evidence = None;
                self.low_ammo_latched = false;
                d.events.push(EngineEvent::WeaponDeactivated);
                d.transition = true;
                true
            }

            (None, None) => false,
        }
    }

    fn commit_switch(&mut self, pending: PendingSwitch, d: &mut Decision) {
        if matches!(self.phase, Phase::Firing(_)) {
            d.commands.push(EngineCommand::WeaponChanged);
        }
        self.phase = Phase::Armed(pending.weapon.clone());
        self.pending = None;
        self.last_fire_evidence = None;
        d.events.push(EngineEvent::WeaponActivated {
            weapon: pending.weapon,
            display_name: pending.display_name,
        });
        d.transition = true;
    }

    fn apply_fire_state(
        &mut self,
        snap: &GameState,
        target: Option<&str>,
        now: Instant,
        d: &mut Decision,
    ) {
        match self.phase.clone() {
            Phase::Armed(weapon) => {
                let has_ammo = snap.ammo_clip.unwrap_or(0) > 0;
                if snap.is_firing && has_ammo && target == Some(weapon.as_str()) {
                    self.phase = Phase::Firing(weapon.clone());
                    self.last_fire_evidence = Some(now);
                    d.events.push(EngineEvent::FireStarted { weapon: weapon.clone() });
                    d.commands.push(EngineCommand::StartFire { weapon });
                    d.transition = true;
                }
            }
            Phase::Firing(weapon) => {
                if snap.is_firing && target == Some(weapon.as_str()) {
                    self.last_fire_evidence = Some(now);
                } else if !snap.is_firing {
                    self.phase = Phase::Armed(weapon);
                    self.last_fire_evidence = None;
                    d.events.push(EngineEvent::FireStopped);
                    d.commands.push(EngineCommand::StopFire);
                    d.transition = true;
                }
            }
            Phase::Idle => {}
        }
    }

    fn apply_ammo_watch(
        &mut self,
        snap: &GameState,
        profile: Option<&Arc<WeaponProfile>>,
        d: &mut Decision,
    ) {
        let (Some(profile), Some(ammo)) = (profile, snap.ammo_clip) else {
            return;
        };

        if ammo > self.low_ammo_threshold {
            self.low_ammo_latched = false;
        } else if ammo > 0 && !self.low_ammo_latched {
            self.low_ammo_latched = true;
            d.events.push(EngineEvent::LowAmmo {
                weapon: profile.id.clone(),
                ammo_clip: ammo,
            });
        }
    }
}

/// The detection task: snapshot slot + control channel + deadline timer
pub struct WeaponDetector {
    store: Arc<PatternStore>,
    flags: Arc<ControlFlags>,
    bus: EventBus,
    view: DetectionView,
    engine_tx: mpsc::Sender<EngineCommand>,
    machine: DetectorMachine,
    latest: Option<GameState>,
}

impl WeaponDetector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<PatternStore>,
        flags: Arc<ControlFlags>,
        bus: EventBus,
        view: DetectionView,
        engine_tx: mpsc::Sender<EngineCommand>,
        dwell: Duration,
        fire_decay: Duration,
        low_ammo_threshold: u16,
    ) -> Self {
        Self {
            store,
            flags,
            bus,
            view,
            engine_tx,
            machine: DetectorMachine::new(dwell, fire_decay, low_ammo_threshold),
            latest: None,
        }
    }

    /// Run until the snapshot slot closes
    pub async fn run(
        mut self,
        mut state_rx: watch::Receiver<Option<GameState>>,
        mut control_rx: mpsc::Receiver<ControlEvent>,
    ) {
        debug!("weapon detector running");
        let mut control_open = true;

        loop {
            let wake = self
                .machine
                .next_deadline()
                .unwrap_or_else(|| Instant::now() + IDLE_WAKE);

            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = state_rx.borrow_and_update().clone();
                    if let Some(snapshot) = snapshot {
                        self.on_snapshot(snapshot);
                    }
                }
                event = control_rx.recv(), if control_open => {
                    match event {
                        Some(event) => self.on_control(event),
                        None => control_open = false,
                    }
                }
                _ = tokio::time::sleep_until(wake) => {
                    let decision = self.machine.tick(Instant::now());
                    self.apply(decision);
                }
            }
        }

        debug!("weapon detector stopped");
    }

    fn on_snapshot(&mut self, snapshot: GameState) {
        let decision = if !self.flags.recoil_enabled() {
            self.machine.force_idle()
        } else {
            let profile = snapshot
                .active_weapon
                .as_deref()
                .and_then(|name| self.store.resolve_telemetry_name(name))
                .cloned();
            if self.flags.detection_enabled() {
                self.machine
                    .observe(&snapshot, profile.as_ref(), Instant::now())
            } else {
                // Manual mode: a hand-picked weapon stays armed; only the
                // fire state follows telemetry
                self.machine
                    .observe_manual(&snapshot, profile.as_ref(), Instant::now())
            }
        };
        self.latest = Some(snapshot);
        self.apply(decision);
    }

    fn on_control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::RecoilToggled(false) | ControlEvent::DetectionToggled(false) => {
                let decision = self.machine.force_idle();
                self.apply(decision);
            }
            ControlEvent::RecoilToggled(true) => {
                // Re-armed by the next telemetry update
            }
            ControlEvent::DetectionToggled(true) => {
                if let Some(snapshot) = self.latest.clone() {
                    self.on_snapshot(snapshot);
                }
            }
            ControlEvent::SelectWeapon(weapon) => {
                if self.flags.detection_enabled() {
                    warn!(weapon = %weapon, "manual selection ignored while detection is enabled");
                    return;
                }
                if !self.flags.recoil_enabled() {
                    warn!(weapon = %weapon, "manual selection ignored while compensation is disabled");
                    return;
                }
                match self.store.get(&weapon) {
                    Some(profile) => {
                        let profile = profile.clone();
                        let decision = self.machine.manual_select(&profile);
                        self.apply(decision);
                    }
                    None => warn!(weapon = %weapon, "manual selection of unknown weapon"),
                }
            }
        }
    }

    fn apply(&mut self, decision: Decision) {
        if decision.is_empty() {
            return;
        }

        if decision.transition {
            let mut view = self.view.write();
            view.current_weapon = self.machine.current_weapon().map(str::to_string);
            view.firing = self.machine.is_firing();
            view.last_transition_at = unix_millis();
        }

        for command in decision.commands {
            if let Err(e) = self.engine_tx.try_send(command) {
                warn!(error = %e, "engine command not delivered");
            }
        }
        for event in decision.events {
            self.bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{RecoilStep, WeaponParams};
    use crate::telemetry::RoundPhase;

    const DWELL: Duration = Duration::from_millis(150);
    const DECAY: Duration = Duration::from_millis(500);

    fn machine() -> DetectorMachine {
        DetectorMachine::new(DWELL, DECAY, 5)
    }

    fn profile(id: &str) -> Arc<WeaponProfile> {
        let params: WeaponParams = serde_json::from_value(serde_json::json!({
            "id": id,
            "display_name": id.to_uppercase(),
            "telemetry_names": [format!("weapon_{id}")],
            "length": 2,
        }))
        .unwrap();
        Arc::new(WeaponProfile::new(
            params,
            vec![
                RecoilStep { dx: 0.0, dy: 0.0, interval_ms: 100.0 },
                RecoilStep { dx: 1.0, dy: 4.0, interval_ms: 100.0 },
            ],
        ))
    }

    fn snap(weapon: Option<&str>, ammo: u16, firing: bool) -> GameState {
        GameState {
            active_weapon: weapon.map(|w| format!("weapon_{w}")),
            ammo_clip: weapon.map(|_| ammo),
            is_firing: firing,
            round_phase: RoundPhase::Live,
            combat_ready: weapon.is_some(),
            received_at: 0,
        }
    }

    fn activated(events: &[EngineEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::WeaponActivated { weapon, .. } => Some(weapon.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn first_weapon_arms_immediately_and_is_idempotent() {
        let mut m = machine();
        let ak = profile("ak47");
        let t0 = Instant::now();

        let d = m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0);
        assert_eq!(activated(&d.events), vec!["ak47"]);
        assert_eq!(m.current_weapon(), Some("ak47"));

        // Identical snapshot again: nothing re-emitted
        let d = m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0 + DWELL);
        assert!(d.is_empty());
    }

    #[test]
    fn fire_cycle_emits_start_and_stop_once() {
        let mut m = machine();
        let ak = profile("ak47");
        let t0 = Instant::now();
        m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0);

        let d = m.observe(&snap(Some("ak47"), 29, true), Some(&ak), t0);
        assert_eq!(
            d.events,
            vec![EngineEvent::FireStarted { weapon: "ak47".into() }]
        );
        assert_eq!(
            d.commands,
            vec![EngineCommand::StartFire { weapon: "ak47".into() }]
        );

        // Sustained fire refreshes evidence without re-emitting
        let d = m.observe(&snap(Some("ak47"), 28, true), Some(&ak), t0);
        assert!(d.is_empty());

        let d = m.observe(&snap(Some("ak47"), 28, false), Some(&ak), t0);
        assert_eq!(d.events, vec![EngineEvent::FireStopped]);
        assert_eq!(d.commands, vec![EngineCommand::StopFire]);
        assert_eq!(m.current_weapon(), Some("ak47"));
    }

    #[test]
    fn switch_within_dwell_yields_only_the_second_weapon() {
        let mut m = machine();
        let (ak, m4, famas) = (profile("ak47"), profile("m4a4"), profile("famas"));
        let t0 = Instant::now();
        m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0);

        // Two switches inside one dwell window
        let d = m.observe(&snap(Some("m4a4"), 30, false), Some(&m4), t0 + Duration::from_millis(10));
        assert!(d.is_empty());
        let d = m.observe(&snap(Some("famas"), 25, false), Some(&famas), t0 + Duration::from_millis(60));
        assert!(d.is_empty());

        // Dwell elapses for the last candidate only
        let d = m.tick(t0 + Duration::from_millis(60) + DWELL);
        assert_eq!(activated(&d.events), vec!["famas"]);
        assert_eq!(m.current_weapon(), Some("famas"));
    }

    #[test]
    fn switch_commits_via_snapshot_after_dwell() {
        let mut m = machine();
        let (ak, m4) = (profile("ak47"), profile("m4a4"));
        let t0 = Instant::now();
        m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0);

        m.observe(&snap(Some("m4a4"), 30, false), Some(&m4), t0);
        let d = m.observe(&snap(Some("m4a4"), 30, false), Some(&m4), t0 + DWELL);
        assert_eq!(activated(&d.events), vec!["m4a4"]);
    }

    #[test]
    fn reverting_to_current_weapon_cancels_pending_switch() {
        let mut m = machine();
        let (ak, m4) = (profile("ak47"), profile("m4a4"));
        let t0 = Instant::now();
        m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0);
        m.observe(&snap(Some("m4a4"), 30, false), Some(&m4), t0);
        m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0 + Duration::from_millis(20));

        let d = m.tick(t0 + DWELL + Duration::from_millis(20));
        assert!(d.is_empty());
        assert_eq!(m.current_weapon(), Some("ak47"));
    }

    #[test]
    fn weapon_change_wins_over_simultaneous_fire_stop() {
        let mut m = machine();
        let (ak, m4) = (profile("ak47"), profile("m4a4"));
        let t0 = Instant::now();
        m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0);
        m.observe(&snap(Some("ak47"), 29, true), Some(&ak), t0);

        // Weapon change reported together with fire-stop: no FireStopped,
        // the switch path runs instead
        let d = m.observe(&snap(Some("m4a4"), 30, false), Some(&m4), t0 + Duration::from_millis(5));
        assert!(!d.events.contains(&EngineEvent::FireStopped));

        // Commit tears the live session down via WeaponChanged
        let d = m.tick(t0 + Duration::from_millis(5) + DWELL);
        assert_eq!(activated(&d.events), vec!["m4a4"]);
        assert_eq!(d.commands, vec![EngineCommand::WeaponChanged]);
        assert!(!m.is_firing());
    }

    #[test]
    fn weapon_loss_while_firing_stops_the_session() {
        let mut m = machine();
        let ak = profile("ak47");
        let t0 = Instant::now();
        m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0);
        m.observe(&snap(Some("ak47"), 29, true), Some(&ak), t0);

        let d = m.observe(&snap(None, 0, false), None, t0);
        assert_eq!(d.events, vec![EngineEvent::WeaponDeactivated]);
        assert_eq!(d.commands, vec![EngineCommand::StopFire]);
        assert_eq!(m.current_weapon(), None);
    }

    #[test]
    fn fire_evidence_decays_without_updates() {
        let mut m = machine();
        let ak = profile("ak47");
        let t0 = Instant::now();
        m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0);
        m.observe(&snap(Some("ak47"), 29, true), Some(&ak), t0);
        assert!(m.is_firing());

        // No decay before the window
        let d = m.tick(t0 + DECAY - Duration::from_millis(1));
        assert!(d.is_empty());

        let d = m.tick(t0 + DECAY);
        assert_eq!(d.events, vec![EngineEvent::FireStopped]);
        assert_eq!(d.commands, vec![EngineCommand::StopFire]);
        assert!(!m.is_firing());
    }

    #[test]
    fn force_idle_deactivates_and_stops_fire() {
        let mut m = machine();
        let ak = profile("ak47");
        let t0 = Instant::now();
        m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0);
        m.observe(&snap(Some("ak47"), 29, true), Some(&ak), t0);

        let d = m.force_idle();
        assert_eq!(d.events, vec![EngineEvent::WeaponDeactivated]);
        assert_eq!(d.commands, vec![EngineCommand::StopFire]);

        // Already idle: nothing more to do
        assert!(m.force_idle().is_empty());
    }

    #[test]
    fn low_ammo_fires_once_per_crossing() {
        let mut m = machine();
        let ak = profile("ak47");
        let t0 = Instant::now();
        m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0);

        let d = m.observe(&snap(Some("ak47"), 5, false), Some(&ak), t0);
        assert_eq!(
            d.events,
            vec![EngineEvent::LowAmmo { weapon: "ak47".into(), ammo_clip: 5 }]
        );
        assert!(!d.transition);

        // Deeper into the threshold: no repeat
        let d = m.observe(&snap(Some("ak47"), 3, false), Some(&ak), t0);
        assert!(d.events.iter().all(|e| !matches!(e, EngineEvent::LowAmmo { .. })));

        // Reload re-arms the warning
        m.observe(&snap(Some("ak47"), 30, false), Some(&ak), t0);
        let d = m.observe(&snap(Some("ak47"), 4, false), Some(&ak), t0);
        assert_eq!(
            d.events,
            vec![EngineEvent::LowAmmo { weapon: "ak47".into(), ammo_clip: 4 }]
        );
    }

    #[test]
    fn manual_select_bypasses_dwell() {
        let mut m = machine();
        let m4 = profile("m4a4");

        let d = m.manual_select(&m4);
        assert_eq!(activated(&d.events), vec!["m4a4"]);
        assert_eq!(m.current_weapon(), Some("m4a4"));

        // Re-selecting the armed weapon is a no-op
        assert!(m.manual_select(&m4).is_empty());
    }

    #[test]
    fn unsupported_weapon_does_not_arm() {
        let mut m = machine();
        let t0 = Instant::now();
        let d = m.observe(&snap(Some("knife"), 0, false), None, t0);
        assert!(d.is_empty());
        assert_eq!(m.current_weapon(), None);
    }

    #[test]
    fn manual_mode_tracks_fire_without_rearming() {
        let mut m = machine();
        let (ak, m4) = (profile("ak47"), profile("m4a4"));
        let t0 = Instant::now();
        m.manual_select(&ak);

        // Telemetry reporting another weapon does not steal the selection
        let d = m.observe_manual(&snap(Some("m4a4"), 30, false), Some(&m4), t0);
        assert!(d.is_empty());
        assert_eq!(m.current_weapon(), Some("ak47"));

        // Fire on the selected weapon still follows telemetry
        let d = m.observe_manual(&snap(Some("ak47"), 29, true), Some(&ak), t0);
        assert_eq!(
            d.commands,
            vec![EngineCommand::StartFire { weapon: "ak47".into() }]
        );
        let d = m.observe_manual(&snap(Some("ak47"), 29, false), Some(&ak), t0);
        assert_eq!(d.commands, vec![EngineCommand::StopFire]);
    }
}
