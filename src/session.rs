//! Riddle interaction for the currently engaged entity.
//!
//! ```text
//! Idle ──begin──▶ PromptShown ──answer ok──▶ Correct (terminal)
//!                     │    ▲
//!             answer wrong │ answer wrong
//!                     ▼    │
//!                 AnsweringWrong ──answer ok──▶ Correct
//! ```
//!
//! A session lives exactly as long as one engagement. It is created when the
//! proximity machine engages a target and dropped when it disengages, so
//! coming back to a solved entity starts a fresh session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::protocol::EntityRecord;
use crate::types::{EntityId, Interaction, Reward};

pub const WRONG_ANSWER_FEEDBACK: &str = "Wrong answer, try again!";

/// Action string sent upstream when a riddle is solved.
pub const SOLVED_ACTION: &str = "riddle_solved";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    PromptShown,
    AnsweringWrong,
    Correct,
}

/// What the presentation layer shows on engagement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Prompt {
    Riddle { entity_name: String, riddle: String },
    Acknowledgement { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum AnswerOutcome {
    Correct { reward: Option<Reward> },
    Wrong { feedback: String },
    /// Empty input, no riddle, already solved, or not yet prompted.
    Ignored,
}

/// Receives solved-interaction reports. Fire-and-forget.
pub trait InteractionReporter: Send + Sync {
    fn report(&self, entity_id: EntityId, action: &str);
}

/// Reporter that drops every report; for offline use and tests.
#[derive(Debug, Default)]
pub struct NullReporter;

impl InteractionReporter for NullReporter {
    fn report(&self, _entity_id: EntityId, _action: &str) {}
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct InteractionSession {
    target: EntityId,
    entity_name: String,
    interaction: Option<Interaction>,
    state: SessionState,
    /// Text currently held in the answer input; cleared after a wrong answer.
    input: String,
    attempts: u32,
    reporter: Arc<dyn InteractionReporter>,
}

impl std::fmt::Debug for InteractionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionSession")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .finish()
    }
}

impl InteractionSession {
    pub fn new(entity: &EntityRecord, reporter: Arc<dyn InteractionReporter>) -> Self {
        Self {
            target: entity.id,
            entity_name: entity.name.clone(),
            interaction: entity.interaction.clone(),
            state: SessionState::Idle,
            input: String::new(),
            attempts: 0,
            reporter,
        }
    }

    pub fn target(&self) -> EntityId {
        self.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Riddle text and answer, when this entity offers a riddle at all.
    fn riddle(&self) -> Option<(&str, &str)> {
        let i = self.interaction.as_ref().filter(|i| i.is_riddle_type())?;
        Some((i.riddle.as_deref()?, i.correct_answer.as_deref()?))
    }

    pub fn is_riddle(&self) -> bool {
        self.riddle().is_some()
    }

    /// Show the prompt. Called once, right after engagement.
    pub fn begin(&mut self) -> Prompt {
        self.state = SessionState::PromptShown;
        self.input.clear();
        match self.riddle() {
            Some((riddle, _)) => Prompt::Riddle {
                entity_name: self.entity_name.clone(),
                riddle: riddle.to_string(),
            },
            None => Prompt::Acknowledgement {
                message: format!("You found {}!", self.entity_name),
            },
        }
    }

    /// Submit the current input (see [`set_input`](Self::set_input)).
    pub fn submit(&mut self) -> AnswerOutcome {
        let text = std::mem::take(&mut self.input);
        self.submit_answer(&text)
    }

    /// Compare `text` against the riddle's answer, trimmed and case-insensitive.
    pub fn submit_answer(&mut self, text: &str) -> AnswerOutcome {
        if !matches!(
            self.state,
            SessionState::PromptShown | SessionState::AnsweringWrong
        ) {
            return AnswerOutcome::Ignored;
        }
        let Some(expected) = self.riddle().map(|(_, a)| a.trim().to_lowercase()) else {
            return AnswerOutcome::Ignored;
        };
        let answer = text.trim();
        if answer.is_empty() {
            return AnswerOutcome::Ignored;
        }

        self.attempts += 1;
        if answer.to_lowercase() == expected {
            self.state = SessionState::Correct;
            self.reporter.report(self.target, SOLVED_ACTION);
            log::info!(
                "riddle for entity {} solved after {} attempt(s)",
                self.target,
                self.attempts
            );
            let reward = self.interaction.as_ref().and_then(|i| i.reward.clone());
            AnswerOutcome::Correct { reward }
        } else {
            self.state = SessionState::AnsweringWrong;
            self.input.clear();
            log::debug!("wrong answer for entity {}", self.target);
            AnswerOutcome::Wrong {
                feedback: WRONG_ANSWER_FEEDBACK.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(EntityId, String)>>);

    impl InteractionReporter for Recorder {
        fn report(&self, entity_id: EntityId, action: &str) {
            self.0.lock().unwrap().push((entity_id, action.to_string()));
        }
    }

    fn entity(interaction: Option<Interaction>) -> EntityRecord {
        EntityRecord {
            id: 42,
            name: "Old Clockmaker".into(),
            personality: "grumpy".into(),
            location: GeoPoint::new(37.7749, -122.4194),
            visibility_radius_m: 100.0,
            interaction,
            interaction_count: 0,
            created_at: None,
            distance: None,
        }
    }

    fn riddle() -> Interaction {
        Interaction {
            kind: "riddle_unlock".into(),
            riddle: Some("I have hands but cannot clap".into()),
            correct_answer: Some("clock".into()),
            reward: Some(Reward {
                kind: "badge".into(),
                value: "Timekeeper".into(),
            }),
            text: None,
        }
    }

    fn session() -> (InteractionSession, Arc<Recorder>) {
        let rec = Arc::new(Recorder::default());
        let s = InteractionSession::new(&entity(Some(riddle())), rec.clone());
        (s, rec)
    }

    #[test]
    fn begins_idle_then_prompts_riddle() {
        let (mut s, _) = session();
        assert_eq!(s.state(), SessionState::Idle);
        let prompt = s.begin();
        assert_eq!(s.state(), SessionState::PromptShown);
        assert_eq!(
            prompt,
            Prompt::Riddle {
                entity_name: "Old Clockmaker".into(),
                riddle: "I have hands but cannot clap".into(),
            }
        );
    }

    #[test]
    fn answers_match_trimmed_and_case_insensitive() {
        for answer in ["Clock", " clock ", "CLOCK"] {
            let (mut s, _) = session();
            s.begin();
            assert!(
                matches!(s.submit_answer(answer), AnswerOutcome::Correct { .. }),
                "{answer:?} should match"
            );
        }
    }

    #[test]
    fn near_miss_is_wrong() {
        let (mut s, rec) = session();
        s.begin();
        assert_eq!(
            s.submit_answer("clocks"),
            AnswerOutcome::Wrong {
                feedback: WRONG_ANSWER_FEEDBACK.into()
            }
        );
        assert_eq!(s.state(), SessionState::AnsweringWrong);
        assert!(rec.0.lock().unwrap().is_empty());
    }

    #[test]
    fn wrong_then_right_reports_once() {
        let (mut s, rec) = session();
        s.begin();
        s.set_input("watch");
        s.submit();
        assert_eq!(s.input(), "");

        s.set_input("clock");
        let outcome = s.submit();
        assert_eq!(
            outcome,
            AnswerOutcome::Correct {
                reward: Some(Reward {
                    kind: "badge".into(),
                    value: "Timekeeper".into()
                })
            }
        );
        assert_eq!(s.state(), SessionState::Correct);
        assert_eq!(s.attempts(), 2);
        assert_eq!(
            rec.0.lock().unwrap().as_slice(),
            &[(42, SOLVED_ACTION.to_string())]
        );
    }

    #[test]
    fn correct_is_terminal() {
        let (mut s, rec) = session();
        s.begin();
        s.submit_answer("clock");
        assert_eq!(s.submit_answer("clock"), AnswerOutcome::Ignored);
        assert_eq!(rec.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn answers_before_prompt_are_ignored() {
        let (mut s, _) = session();
        assert_eq!(s.submit_answer("clock"), AnswerOutcome::Ignored);
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn empty_input_is_ignored() {
        let (mut s, _) = session();
        s.begin();
        assert_eq!(s.submit_answer("   "), AnswerOutcome::Ignored);
        assert_eq!(s.state(), SessionState::PromptShown);
        assert_eq!(s.attempts(), 0);
    }

    #[test]
    fn non_riddle_entity_gets_acknowledgement() {
        let message = Interaction {
            kind: "message".into(),
            text: Some("boo".into()),
            ..Default::default()
        };
        let mut s = InteractionSession::new(&entity(Some(message)), Arc::new(NullReporter));
        assert_eq!(
            s.begin(),
            Prompt::Acknowledgement {
                message: "You found Old Clockmaker!".into()
            }
        );
        assert_eq!(s.submit_answer("clock"), AnswerOutcome::Ignored);

        let mut bare = InteractionSession::new(&entity(None), Arc::new(NullReporter));
        assert!(matches!(bare.begin(), Prompt::Acknowledgement { .. }));
        assert!(!bare.is_riddle());
    }

    #[test]
    fn riddle_without_answer_degrades_to_acknowledgement() {
        let mut broken = riddle();
        broken.correct_answer = None;
        let mut s = InteractionSession::new(&entity(Some(broken)), Arc::new(NullReporter));
        assert!(matches!(s.begin(), Prompt::Acknowledgement { .. }));
    }
}
