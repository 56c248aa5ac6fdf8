//! Survey / Engaged mode switch with a hysteresis band.
//!
//! ```text
//!            any d < trigger (closest wins)
//!   Survey ──────────────────────────────────▶ Engaged{target}
//!     ▲                                            │
//!     └──── target gone  or  d(target) > exit ─────┘
//! ```
//!
//! While engaged the machine is committed to its target; a closer entity
//! does not steal the engagement. At most one transition happens per
//! evaluation.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorldError};
use crate::types::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ProximityMode {
    Survey,
    Engaged { target: EntityId },
}

impl ProximityMode {
    pub fn is_engaged(&self) -> bool {
        matches!(self, Self::Engaged { .. })
    }

    pub fn target(&self) -> Option<EntityId> {
        match self {
            Self::Engaged { target } => Some(*target),
            Self::Survey => None,
        }
    }
}

impl std::fmt::Display for ProximityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Survey => write!(f, "survey"),
            Self::Engaged { target } => write!(f, "engaged({target})"),
        }
    }
}

/// Why an engagement ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The target is no longer in the local entity set.
    TargetDespawned,
    /// The target moved beyond `exit_distance`.
    OutOfRange { distance: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModeTransition {
    Engaged { target: EntityId, distance: f64 },
    Disengaged { target: EntityId, reason: ExitReason },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProximityConfig {
    pub trigger_distance: f64,
    pub exit_distance: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            trigger_distance: 50.0,
            exit_distance: 75.0,
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProximityStateMachine {
    config: ProximityConfig,
    mode: ProximityMode,
}

impl ProximityStateMachine {
    /// Fails unless `0 < trigger_distance < exit_distance`.
    pub fn new(config: ProximityConfig) -> Result<Self> {
        let ProximityConfig {
            trigger_distance,
            exit_distance,
        } = config;
        if !(trigger_distance.is_finite() && trigger_distance > 0.0) {
            return Err(WorldError::Config(format!(
                "trigger_distance must be positive, got {trigger_distance}"
            )));
        }
        if !(exit_distance.is_finite() && exit_distance > trigger_distance) {
            return Err(WorldError::Config(format!(
                "exit_distance ({exit_distance}) must exceed trigger_distance ({trigger_distance})"
            )));
        }
        Ok(Self {
            config,
            mode: ProximityMode::Survey,
        })
    }

    pub fn mode(&self) -> ProximityMode {
        self.mode
    }

    pub fn config(&self) -> ProximityConfig {
        self.config
    }

    /// Evaluate one tick against the current `(id, distance)` pairs.
    pub fn evaluate<I>(&mut self, distances: I) -> Option<ModeTransition>
    where
        I: IntoIterator<Item = (EntityId, f64)>,
    {
        match self.mode {
            ProximityMode::Survey => {
                let closest = distances
                    .into_iter()
                    .filter(|(_, d)| *d < self.config.trigger_distance)
                    .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))?;

                let (target, distance) = closest;
                self.mode = ProximityMode::Engaged { target };
                log::info!("engaged entity {target} at {distance:.1}");
                Some(ModeTransition::Engaged { target, distance })
            }
            ProximityMode::Engaged { target } => {
                let current = distances
                    .into_iter()
                    .find(|(id, _)| *id == target)
                    .map(|(_, d)| d);

                let reason = match current {
                    None => ExitReason::TargetDespawned,
                    Some(d) if d > self.config.exit_distance => {
                        ExitReason::OutOfRange { distance: d }
                    }
                    Some(_) => return None,
                };

                self.mode = ProximityMode::Survey;
                log::info!("disengaged entity {target}: {reason:?}");
                Some(ModeTransition::Disengaged { target, reason })
            }
        }
    }

    /// Return to `Survey` without evaluating (e.g. on teardown).
    pub fn reset(&mut self) -> Option<EntityId> {
        let target = self.mode.target();
        self.mode = ProximityMode::Survey;
        target
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
