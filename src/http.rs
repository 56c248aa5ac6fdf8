//! axum router exposing the ghost service over HTTP.
//!
//! Handlers are thin: they validate the request body through the
//! [`protocol`](crate::protocol) helpers, call into [`GeoQueryService`] or
//! [`ViewerRegistry`], and let [`WorldError`] pick the status code. Query
//! and path rejections are folded into [`WorldError::Validation`] so every
//! failure carries an `{"error": ...}` body.

use std::sync::Arc;

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tower_http::trace::TraceLayer;

use crate::error::{Result, WorldError};
use crate::generator::ContentGenerator;
use crate::protocol::{
    paths, Ack, CreateEntityRequest, EntityRecord, Health, InteractRequest, NearQuery,
    PositionReport,
};
use crate::service::GeoQueryService;
use crate::types::{EntityId, ServiceConfig, ViewerPosition};
use crate::viewers::ViewerRegistry;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GeoQueryService>,
    pub viewers: Arc<ViewerRegistry>,
    pub generator: Arc<dyn ContentGenerator>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(config: ServiceConfig, generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            service: Arc::new(GeoQueryService::from_config(&config)),
            viewers: Arc::new(ViewerRegistry::new()),
            generator,
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(paths::HEALTH, get(health))
        .route(paths::ENTITIES, get(list_entities).post(create_entity))
        .route("/entities/:id", get(get_entity))
        .route("/entities/:id/interact", post(interact))
        .route(paths::VIEWER_POSITION, post(report_position))
        .route(paths::VIEWERS, get(list_viewers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".into(),
    })
}

async fn list_entities(
    State(state): State<AppState>,
    query: std::result::Result<Query<NearQuery>, QueryRejection>,
) -> Result<Json<Vec<EntityRecord>>> {
    let Query(query) = query?;
    let center = query.center()?;
    let radius = query.radius_or(state.config.default_radius_m)?;
    if let Some(viewer) = query.viewer_id.as_deref() {
        log::debug!("entity query from viewer {}", viewer);
    }

    let records = state
        .service
        .query(center, radius)
        .iter()
        .map(|hit| EntityRecord::from_entity(&hit.entity, hit.distance_m))
        .collect();
    Ok(Json(records))
}

async fn get_entity(
    State(state): State<AppState>,
    id: std::result::Result<Path<EntityId>, PathRejection>,
) -> Result<Json<EntityRecord>> {
    let Path(id) = id?;
    let entity = state.service.get(id)?;
    Ok(Json(EntityRecord::from(&entity)))
}

async fn create_entity(
    State(state): State<AppState>,
    body: Option<Json<CreateEntityRequest>>,
) -> Result<Json<EntityRecord>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let (prompt, lat, lng) = req.require()?;
    log::info!(
        "generating entity via {} at ({:.6}, {:.6})",
        state.generator.name(),
        lat,
        lng
    );
    let generated = state.generator.generate(&prompt, lat, lng).await?;
    let entity = state.service.create_entity(generated)?;
    Ok(Json(EntityRecord::from(&entity)))
}

async fn interact(
    State(state): State<AppState>,
    id: std::result::Result<Path<EntityId>, PathRejection>,
    body: Option<Json<InteractRequest>>,
) -> Result<Json<Ack>> {
    let Path(id) = id?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let count = state.service.report_interaction(id)?;
    log::info!(
        "interaction '{}' on entity {} by viewer {} (total {})",
        req.action.as_deref().unwrap_or("unspecified"),
        id,
        req.viewer_id.as_deref().unwrap_or("anonymous"),
        count
    );
    Ok(Json(Ack::ok()))
}

async fn report_position(
    State(state): State<AppState>,
    body: Option<Json<PositionReport>>,
) -> Result<Json<Ack>> {
    let Json(report) =
        body.ok_or_else(|| WorldError::validation("viewer_id, lat, lng required"))?;
    let (viewer_id, point) = report.require()?;
    state.viewers.upsert(&viewer_id, point);
    log::debug!("viewer {} at {}", viewer_id, point);
    Ok(Json(Ack::ok()))
}

async fn list_viewers(State(state): State<AppState>) -> Json<Vec<ViewerPosition>> {
    Json(state.viewers.active(Utc::now(), state.config.viewer_ttl()))
}
