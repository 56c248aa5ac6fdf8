//! GeoQueryService – authoritative entity store and spatial query.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorldError};
use crate::generator::GeneratedEntity;
use crate::geo::haversine_m;
use crate::types::{Entity, EntityId, GeoPoint, ServiceConfig, DEFAULT_MAX_RESULTS};

// ---------------------------------------------------------------------------
// Query result
// ---------------------------------------------------------------------------

/// One entity returned by a query.
#[derive(Debug, Clone)]
pub struct EntityHit {
    pub entity: Entity,
    /// Great-circle distance from the query centre; `None` for the
    /// unfiltered creation-order listing.
    pub distance_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub total_entities: usize,
    pub total_interactions: u64,
    pub total_queries: u64,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// In-memory entity store with haversine radius queries.
///
/// Query and mutation calls are independent; the store lock is never held
/// across anything slower than a map operation.
pub struct GeoQueryService {
    entities: RwLock<BTreeMap<EntityId, Entity>>,
    next_id: AtomicU64,
    queries: AtomicU64,
    max_results: usize,
}

impl Default for GeoQueryService {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RESULTS)
    }
}

impl GeoQueryService {
    /// `max_results` is clamped to [`DEFAULT_MAX_RESULTS`].
    pub fn new(max_results: usize) -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            queries: AtomicU64::new(0),
            max_results: max_results.min(DEFAULT_MAX_RESULTS),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.max_results)
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Entities strictly closer than `radius_m` to `center`.
    ///
    /// Ordered by distance, then ascending id; capped at `max_results`.
    /// A candidate whose computed distance equals `radius_m` is excluded.
    pub fn query_near(&self, center: GeoPoint, radius_m: f64) -> Vec<EntityHit> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let mut hits: Vec<EntityHit> = self
            .entities
            .read()
            .values()
            .filter_map(|e| {
                let d = haversine_m(center, e.location);
                (d < radius_m).then(|| EntityHit {
                    entity: e.clone(),
                    distance_m: Some(d),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            let da = a.distance_m.unwrap_or(f64::INFINITY);
            let db = b.distance_m.unwrap_or(f64::INFINITY);
            da.total_cmp(&db).then(a.entity.id.cmp(&b.entity.id))
        });
        hits.truncate(self.max_results);

        debug!(
            "query_near {} r={:.0}m -> {} hit(s)",
            center,
            radius_m,
            hits.len()
        );
        hits
    }

    /// Most recently created entities first, no distance filter.
    pub fn recent(&self) -> Vec<EntityHit> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let mut all: Vec<Entity> = self.entities.read().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        all.truncate(self.max_results);

        debug!("recent -> {} entit(ies)", all.len());
        all.into_iter()
            .map(|entity| EntityHit {
                entity,
                distance_m: None,
            })
            .collect()
    }

    /// Dispatch to [`query_near`](Self::query_near) or [`recent`](Self::recent).
    pub fn query(&self, center: Option<GeoPoint>, radius_m: f64) -> Vec<EntityHit> {
        match center {
            Some(c) => self.query_near(c, radius_m),
            None => self.recent(),
        }
    }

    pub fn get(&self, id: EntityId) -> Result<Entity> {
        self.entities
            .read()
            .get(&id)
            .cloned()
            .ok_or(WorldError::NotFound(id))
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Persist a generated entity, assigning its id.
    pub fn create_entity(&self, generated: GeneratedEntity) -> Result<Entity> {
        self.create_entity_at(generated, Utc::now())
    }

    pub fn create_entity_at(
        &self,
        generated: GeneratedEntity,
        created_at: DateTime<Utc>,
    ) -> Result<Entity> {
        let location = generated.location()?;
        let visibility_radius_m = generated.visibility_radius_m();
        let interaction = generated.interaction();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entity = Entity {
            id,
            name: generated.name.unwrap_or_else(|| format!("Ghost #{id}")),
            personality: generated.personality.unwrap_or_default(),
            location,
            visibility_radius_m,
            interaction,
            interaction_count: 0,
            created_at,
        };

        self.entities.write().insert(id, entity.clone());
        info!(
            "created entity {} '{}' at {} (radius {:.0}m)",
            entity.id, entity.name, entity.location, entity.visibility_radius_m
        );
        Ok(entity)
    }

    /// Increment the interaction counter of `id`, returning the new count.
    pub fn report_interaction(&self, id: EntityId) -> Result<u64> {
        let mut entities = self.entities.write();
        let entity = entities.get_mut(&id).ok_or(WorldError::NotFound(id))?;
        entity.interaction_count += 1;
        Ok(entity.interaction_count)
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> ServiceStats {
        let entities = self.entities.read();
        ServiceStats {
            total_entities: entities.len(),
            total_interactions: entities.values().map(|e| e.interaction_count).sum(),
            total_queries: self.queries.load(Ordering::Relaxed),
        }
    }
}
