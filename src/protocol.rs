//! HTTP wire protocol between the ghost service and its clients.
//!
//! ## Routes
//!
//! | Method | Path                      | Body / query            | Reply                |
//! |--------|---------------------------|-------------------------|----------------------|
//! | GET    | `/entities`               | [`NearQuery`]           | `Vec<EntityRecord>`  |
//! | GET    | `/entities/{id}`          | –                       | [`EntityRecord`]     |
//! | POST   | `/entities`               | [`CreateEntityRequest`] | [`EntityRecord`]     |
//! | POST   | `/entities/{id}/interact` | [`InteractRequest`]     | [`Ack`]              |
//! | POST   | `/viewer/position`        | [`PositionReport`]      | [`Ack`]              |
//! | GET    | `/viewers`                | –                       | `Vec<ViewerPosition>`|
//! | GET    | `/health`                 | –                       | [`Health`]           |
//!
//! ## Design rules
//!
//! 1. Every struct is `Serialize + Deserialize` with snake_case JSON.
//! 2. Request bodies use `Option` fields; presence is validated by the
//!    handler so a missing field is a `400`, not a framework rejection.
//! 3. Errors are `{"error": "<message>"}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorldError};
use crate::types::{Entity, EntityId, GeoPoint, Interaction};

// ---------------------------------------------------------------------------
// Entity record
// ---------------------------------------------------------------------------

/// An entity as it appears on the wire.
///
/// `distance` is the great-circle distance from the query centre in whole
/// metres, or `null` for unfiltered and single-entity reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub personality: String,
    pub location: GeoPoint,
    pub visibility_radius_m: f64,
    #[serde(default)]
    pub interaction: Option<Interaction>,
    #[serde(default)]
    pub interaction_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub distance: Option<f64>,
}

impl EntityRecord {
    pub fn from_entity(entity: &Entity, distance_m: Option<f64>) -> Self {
        Self {
            id: entity.id,
            name: entity.name.clone(),
            personality: entity.personality.clone(),
            location: entity.location,
            visibility_radius_m: entity.visibility_radius_m,
            interaction: entity.interaction.clone(),
            interaction_count: entity.interaction_count,
            created_at: Some(entity.created_at),
            distance: distance_m.map(f64::round),
        }
    }
}

impl From<&Entity> for EntityRecord {
    fn from(entity: &Entity) -> Self {
        Self::from_entity(entity, None)
    }
}

// ---------------------------------------------------------------------------
// Queries and requests (client → server)
// ---------------------------------------------------------------------------

/// Query string of `GET /entities`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NearQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_id: Option<String>,
}

impl NearQuery {
    /// Resolve the optional centre: both coordinates or neither.
    pub fn center(&self) -> Result<Option<GeoPoint>> {
        match (self.lat, self.lng) {
            (None, None) => Ok(None),
            (Some(lat), Some(lng)) => {
                let point = GeoPoint::new(lat, lng);
                if !point.is_valid() {
                    return Err(WorldError::validation(format!(
                        "invalid query centre {point}"
                    )));
                }
                Ok(Some(point))
            }
            _ => Err(WorldError::validation("lat and lng must be given together")),
        }
    }

    /// Explicit radius, or `default_m` when absent. Must be positive.
    pub fn radius_or(&self, default_m: f64) -> Result<f64> {
        let radius = self.radius.unwrap_or(default_m);
        if radius.is_finite() && radius > 0.0 {
            Ok(radius)
        } else {
            Err(WorldError::validation(format!(
                "radius must be a positive number, got {radius}"
            )))
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEntityRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl CreateEntityRequest {
    /// Returns `(prompt, lat, lng)` or a validation error naming what is missing.
    pub fn require(&self) -> Result<(String, f64, f64)> {
        match (self.prompt.as_deref(), self.lat, self.lng) {
            (Some(prompt), Some(lat), Some(lng)) if !prompt.trim().is_empty() => {
                if !GeoPoint::new(lat, lng).is_valid() {
                    return Err(WorldError::validation("lat/lng out of range"));
                }
                Ok((prompt.to_string(), lat, lng))
            }
            _ => Err(WorldError::validation("prompt, lat, lng required")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionReport {
    #[serde(default)]
    pub viewer_id: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl PositionReport {
    pub fn new(viewer_id: impl Into<String>, point: GeoPoint) -> Self {
        Self {
            viewer_id: Some(viewer_id.into()),
            lat: Some(point.lat),
            lng: Some(point.lng),
        }
    }

    pub fn require(&self) -> Result<(String, GeoPoint)> {
        match (self.viewer_id.as_deref(), self.lat, self.lng) {
            (Some(id), Some(lat), Some(lng)) if !id.is_empty() => {
                let point = GeoPoint::new(lat, lng);
                if !point.is_valid() {
                    return Err(WorldError::validation("lat/lng out of range"));
                }
                Ok((id.to_string(), point))
            }
            _ => Err(WorldError::validation("viewer_id, lat, lng required")),
        }
    }
}

// ---------------------------------------------------------------------------
// Replies (server → client)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
}

// ---------------------------------------------------------------------------
// Route helpers
// ---------------------------------------------------------------------------

/// All HTTP paths used by the protocol.
pub mod paths {
    pub const HEALTH: &str = "/health";
    pub const ENTITIES: &str = "/entities";
    pub const VIEWER_POSITION: &str = "/viewer/position";
    pub const VIEWERS: &str = "/viewers";

    pub fn entity(id: u64) -> String {
        format!("{ENTITIES}/{id}")
    }

    pub fn interact(id: u64) -> String {
        format!("{ENTITIES}/{id}/interact")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_query_requires_both_coordinates() {
        let q = NearQuery {
            lat: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(q.center(), Err(WorldError::Validation(_))));
        assert!(NearQuery::default().center().unwrap().is_none());
    }

    #[test]
    fn near_query_radius_defaults_and_rejects_non_positive() {
        let mut q = NearQuery::default();
        assert_eq!(q.radius_or(1000.0).unwrap(), 1000.0);
        q.radius = Some(0.0);
        assert!(q.radius_or(1000.0).is_err());
        q.radius = Some(-5.0);
        assert!(q.radius_or(1000.0).is_err());
    }

    #[test]
    fn create_request_reports_missing_fields() {
        let req = CreateEntityRequest {
            prompt: Some("a sad librarian".into()),
            lat: Some(37.0),
            lng: None,
        };
        assert!(matches!(req.require(), Err(WorldError::Validation(_))));
    }

    #[test]
    fn record_parses_server_payload() {
        let json = r#"{
            "id": 7,
            "name": "Old Clockmaker",
            "personality": "grumpy",
            "location": {"lat": 37.7749, "lng": -122.4194},
            "visibility_radius_m": 100,
            "interaction": {
                "type": "riddle_unlock",
                "riddle": "I have hands but cannot clap",
                "correct_answer": "clock",
                "reward": {"type": "badge", "value": "Timekeeper"}
            },
            "distance": 0
        }"#;
        let r: EntityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.id, 7);
        assert_eq!(r.distance, Some(0.0));
        let interaction = r.interaction.unwrap();
        assert!(interaction.is_riddle_type());
        assert_eq!(interaction.reward.unwrap().value, "Timekeeper");
    }

    #[test]
    fn paths_format_ids() {
        assert_eq!(paths::entity(3), "/entities/3");
        assert_eq!(paths::interact(3), "/entities/3/interact");
    }
}
