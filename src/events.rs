//! Semantic client events delivered to the presentation layer.
//!
//! The client runtime translates reconciler callbacks, proximity transitions
//! and session results into these values and queues them on a channel. The
//! renderer drains the channel on its own frame; no engine types appear here.
//!
//! Local coordinates are metres in the viewer's tangent plane.

use crate::proximity::ExitReason;
use crate::protocol::EntityRecord;
use crate::session::{AnswerOutcome, Prompt};
use crate::types::EntityId;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    // ------------------------------------------------------------------
    // Local entity set
    // ------------------------------------------------------------------
    /// An entity entered the local set.
    EntitySpawned { record: EntityRecord },
    /// Fresh server data for an entity already in the local set.
    EntityUpdated { record: EntityRecord },
    /// An entity left the local set; free its render object.
    EntityDespawned { entity_id: EntityId },

    // ------------------------------------------------------------------
    // Presentation mode
    // ------------------------------------------------------------------
    /// Survey surfaces hidden, engaged surfaces shown.
    Engaged { target: EntityId, distance: f64 },
    /// Back to survey; any interaction UI must be torn down.
    Disengaged { target: EntityId, reason: ExitReason },

    // ------------------------------------------------------------------
    // Interaction
    // ------------------------------------------------------------------
    PromptShown { target: EntityId, prompt: Prompt },
    AnswerResult { target: EntityId, outcome: AnswerOutcome },

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------
    /// A poll failed; the local set was left untouched.
    PollFailed { reason: String },
}
