//! Per-tick evaluation: proximity mode plus the nested interaction session.
//!
//! `Engagement` is the only writer of mode and session state. It reads the
//! local entity set (owned by the reconciler) once per tick and reports every
//! change as a [`ClientEvent`].

use std::sync::Arc;

use crate::error::Result;
use crate::events::ClientEvent;
use crate::proximity::{ModeTransition, ProximityConfig, ProximityMode, ProximityStateMachine};
use crate::reconciler::EntityReconciler;
use crate::session::{AnswerOutcome, InteractionReporter, InteractionSession, SessionState};
use crate::types::EntityId;

pub struct Engagement {
    machine: ProximityStateMachine,
    session: Option<InteractionSession>,
    reporter: Arc<dyn InteractionReporter>,
}

impl std::fmt::Debug for Engagement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engagement")
            .field("mode", &self.machine.mode())
            .field("session", &self.session)
            .finish()
    }
}

impl Engagement {
    pub fn new(config: ProximityConfig, reporter: Arc<dyn InteractionReporter>) -> Result<Self> {
        Ok(Self {
            machine: ProximityStateMachine::new(config)?,
            session: None,
            reporter,
        })
    }

    pub fn mode(&self) -> ProximityMode {
        self.machine.mode()
    }

    pub fn session(&self) -> Option<&InteractionSession> {
        self.session.as_ref()
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(InteractionSession::state)
    }

    /// Run one evaluation against live `(id, distance)` pairs.
    pub fn tick(
        &mut self,
        entities: &EntityReconciler,
        distances: &[(EntityId, f64)],
    ) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        let Some(transition) = self.machine.evaluate(distances.iter().copied()) else {
            return events;
        };

        match transition {
            ModeTransition::Engaged { target, distance } => {
                events.push(ClientEvent::Engaged { target, distance });
                if let Some(local) = entities.get(target) {
                    let mut session = InteractionSession::new(&local.record, self.reporter.clone());
                    let prompt = session.begin();
                    events.push(ClientEvent::PromptShown { target, prompt });
                    self.session = Some(session);
                }
            }
            ModeTransition::Disengaged { target, reason } => {
                // Discard unconditionally, solved or not.
                if let Some(session) = self.session.take() {
                    log::debug!(
                        "discarding session for entity {} in state {:?}",
                        session.target(),
                        session.state()
                    );
                }
                events.push(ClientEvent::Disengaged { target, reason });
            }
        }

        events
    }

    /// Forward an answer to the active session.
    pub fn submit_answer(&mut self, text: &str) -> Option<ClientEvent> {
        let session = self.session.as_mut()?;
        let outcome = session.submit_answer(text);
        if outcome == AnswerOutcome::Ignored {
            return None;
        }
        Some(ClientEvent::AnswerResult {
            target: session.target(),
            outcome,
        })
    }

    /// Return to survey and drop the session (teardown).
    pub fn reset(&mut self) {
        self.session = None;
        self.machine.reset();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
