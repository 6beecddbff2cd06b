//! Compensation engine: the pattern-stepping timing core
//!
//! Consumes detector commands and, while fire is held on an armed weapon,
//! emits one compensating pointer delta per pattern step. The step sleep
//! runs inside `select!` with the command channel, so an interrupt cancels
//! the wait itself, not just the following emit. At most one session is ever
//! live; a new `StartFire` fully tears the previous one down first.

pub mod driver;
pub mod session;

pub use driver::{InjectionError, PointerDriver, TracingPointerDriver};
pub use session::CompensationSession;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::control::ControlFlags;
use crate::detect::EngineCommand;
use crate::events::{EngineEvent, EventBus};
use crate::patterns::{PatternStore, WeaponProfile};

/// Consecutive injection failures that abort the session
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Flag poll cadence while holding an exhausted pattern
const EXHAUSTED_POLL: Duration = Duration::from_millis(50);

pub struct CompensationEngine {
    store: Arc<PatternStore>,
    flags: Arc<ControlFlags>,
    bus: EventBus,
    pointer: Arc<dyn PointerDriver>,
    rx: mpsc::Receiver<EngineCommand>,
}

impl CompensationEngine {
    pub fn new(
        store: Arc<PatternStore>,
        flags: Arc<ControlFlags>,
        bus: EventBus,
        pointer: Arc<dyn PointerDriver>,
        rx: mpsc::Receiver<EngineCommand>,
    ) -> Self {
        Self {
            store,
            flags,
            bus,
            pointer,
            rx,
        }
    }

    /// Run until the command channel closes
    pub async fn run(mut self) {
        debug!("compensation engine running");

        let mut carried: Option<EngineCommand> = None;
        loop {
            let command = match carried.take() {
                Some(command) => command,
                None => match self.rx.recv().await {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                EngineCommand::StartFire { weapon } => {
                    if !self.flags.recoil_enabled() {
                        debug!(weapon = %weapon, "fire ignored: compensation disabled");
                        continue;
                    }
                    let Some(profile) = self.store.get(&weapon).cloned() else {
                        warn!(weapon = %weapon, "fire on unknown weapon ignored");
                        continue;
                    };
                    carried = self.run_session(profile).await;
                }
                // No live session to act on
                EngineCommand::StopFire | EngineCommand::WeaponChanged => {}
            }
        }

        debug!("compensation engine stopped");
    }

    /// Drive one session to its end.
    ///
    /// Returns a `StartFire` that interrupted this session so the caller can
    /// begin the next one with this session already torn down.
    async fn run_session(&mut self, profile: Arc<WeaponProfile>) -> Option<EngineCommand> {
        let mut session = CompensationSession::new(profile);
        info!(session = %session.id, weapon = %session.weapon().id, "compensation session started");
        let mut failures: u32 = 0;

        loop {
            // Flags polled right before the emit
            if !self.flags.recoil_enabled() {
                debug!(session = %session.id, "session ended: compensation disabled");
                return None;
            }

            if session.exhausted() {
                // Sustained fire past pattern coverage: hold at zero further
                // compensation until an interrupt or a disable
                tokio::select! {
                    command = self.rx.recv() => return Self::interrupted(&session, command),
                    _ = tokio::time::sleep(EXHAUSTED_POLL) => continue,
                }
            }

            let Some(step) = session.emit() else { continue };

            if step.dx != 0 || step.dy != 0 {
                match self.pointer.move_by(step.dx, step.dy) {
                    Ok(()) => failures = 0,
                    Err(e) => {
                        failures += 1;
                        warn!(
                            session = %session.id,
                            step = step.index,
                            consecutive = failures,
                            error = %e,
                            "pointer injection failed; step skipped"
                        );
                        if failures >= MAX_CONSECUTIVE_FAILURES {
                            let reason = format!(
                                "pointer injection failed {failures} consecutive times"
                            );
                            warn!(session = %session.id, "session aborted: {reason}");
                            self.bus.publish(EngineEvent::EngineFault {
                                session: session.id,
                                reason,
                            });
                            return None;
                        }
                    }
                }
            }

            let wait = session.step_wait().unwrap_or(Duration::ZERO);
            session.advance();

            // Flags polled right before the sleep
            if !self.flags.recoil_enabled() {
                debug!(session = %session.id, "session ended: compensation disabled");
                return None;
            }

            tokio::select! {
                command = self.rx.recv() => return Self::interrupted(&session, command),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn interrupted(
        session: &CompensationSession,
        command: Option<EngineCommand>,
    ) -> Option<EngineCommand> {
        match command {
            Some(EngineCommand::StopFire) => {
                debug!(
                    session = %session.id,
                    steps = session.index(),
                    elapsed_ms = session.started_at.elapsed().as_millis() as u64,
                    "session ended: fire stopped"
                );
                None
            }
            Some(EngineCommand::WeaponChanged) => {
                debug!(session = %session.id, "session ended: weapon changed");
                None
            }
            Some(start @ EngineCommand::StartFire { .. }) => {
                debug!(session = %session.id, "session replaced by new fire");
                Some(start)
            }
            None => None,
        }
    }
}
