//! Core world types shared across all modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, WorldError};

/// Server-assigned entity identifier.
pub type EntityId = u64;

// ---------------------------------------------------------------------------
// Geodetic coordinates
// ---------------------------------------------------------------------------

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite and inside the usual ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// A point in the viewer's local tangent plane, in metres.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct LocalPoint {
    pub x: f64,
    pub y: f64,
}

impl LocalPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn distance_to(&self, other: &LocalPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl std::fmt::Display for LocalPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reward {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// Optional interaction descriptor attached to an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub riddle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<Reward>,
    /// Free text for message-style interactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Interaction {
    /// `riddle` itself or any `riddle_*` variant (e.g. `riddle_unlock`).
    pub fn is_riddle_type(&self) -> bool {
        self.kind == "riddle" || self.kind.starts_with("riddle_")
    }
}

/// A persisted geolocated entity (a "ghost").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub personality: String,
    pub location: GeoPoint,
    pub visibility_radius_m: f64,
    pub interaction: Option<Interaction>,
    pub interaction_count: u64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Viewers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerPosition {
    pub viewer_id: String,
    pub lat: f64,
    pub lng: f64,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

pub const DEFAULT_MAX_RESULTS: usize = 100;
pub const DEFAULT_QUERY_RADIUS_M: f64 = 1000.0;
pub const DEFAULT_VISIBILITY_RADIUS_M: f64 = 100.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Socket address the HTTP API binds to.
    pub bind_addr: String,
    /// Viewer positions older than this are evicted.
    pub viewer_ttl_secs: u64,
    /// How often the viewer sweep runs.
    pub sweep_interval_secs: u64,
    /// Hard cap on entities returned per query.
    pub max_results: usize,
    /// Radius used when a centered query omits one.
    pub default_radius_m: f64,
    /// Chat-completions generator; the offline generator is used when unset.
    pub generator: Option<GeneratorConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:6000".into(),
            viewer_ttl_secs: 30,
            sweep_interval_secs: 5,
            max_results: DEFAULT_MAX_RESULTS,
            default_radius_m: DEFAULT_QUERY_RADIUS_M,
            generator: None,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.viewer_ttl_secs == 0 || self.sweep_interval_secs == 0 {
            return Err(WorldError::Config(
                "viewer_ttl_secs and sweep_interval_secs must be positive".into(),
            ));
        }
        if self.max_results == 0 || self.max_results > DEFAULT_MAX_RESULTS {
            return Err(WorldError::Config(format!(
                "max_results must be between 1 and {DEFAULT_MAX_RESULTS}, got {}",
                self.max_results
            )));
        }
        if !(self.default_radius_m.is_finite() && self.default_radius_m > 0.0) {
            return Err(WorldError::Config(
                "default_radius_m must be a positive number".into(),
            ));
        }
        Ok(())
    }

    pub fn viewer_ttl(&self) -> Duration {
        Duration::from_secs(self.viewer_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Base URL of an OpenAI-compatible deployment.
    pub endpoint: String,
    pub api_key: String,
    #[serde(default = "default_deployment")]
    pub deployment: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
}

fn default_deployment() -> String {
    "gpt-4o".into()
}

fn default_api_version() -> String {
    "2024-02-15-preview".into()
}

fn default_generator_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the ghost API.
    pub api_url: String,
    /// Interval between entity polls.
    pub poll_interval_ms: u64,
    /// Interval between position reports.
    pub report_interval_ms: u64,
    /// Interval between proximity evaluations.
    pub tick_interval_ms: u64,
    /// Radius sent with every poll.
    pub fetch_radius_m: f64,
    /// Enter `Engaged` below this distance.
    pub trigger_distance: f64,
    /// Leave `Engaged` above this distance.
    pub exit_distance: f64,
    /// Per-request timeout applied by the HTTP client.
    pub request_timeout_ms: u64,
    /// Drop poll responses older than the last applied one.
    pub ignore_stale_responses: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:6000".into(),
            poll_interval_ms: 30_000,
            report_interval_ms: 5_000,
            tick_interval_ms: 100,
            fetch_radius_m: DEFAULT_QUERY_RADIUS_M,
            trigger_distance: 50.0,
            exit_distance: 75.0,
            request_timeout_ms: 10_000,
            ignore_stale_responses: false,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 || self.report_interval_ms == 0 || self.tick_interval_ms == 0
        {
            return Err(WorldError::Config("intervals must be positive".into()));
        }
        if !(self.fetch_radius_m.is_finite() && self.fetch_radius_m > 0.0) {
            return Err(WorldError::Config(
                "fetch_radius_m must be a positive number".into(),
            ));
        }
        if !(self.trigger_distance > 0.0 && self.exit_distance > self.trigger_distance) {
            return Err(WorldError::Config(format!(
                "exit_distance ({}) must exceed trigger_distance ({})",
                self.exit_distance, self.trigger_distance
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
