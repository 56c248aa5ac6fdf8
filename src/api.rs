//! Client-side access to the ghost service.
//!
//! [`GhostApi`] is the seam the client runtime is built against; tests plug
//! in an in-process fake, the binaries use [`HttpGhostApi`].

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{Result, WorldError};
use crate::protocol::{
    paths, Ack, CreateEntityRequest, EntityRecord, InteractRequest, NearQuery, PositionReport,
};
use crate::types::{ClientConfig, EntityId, GeoPoint};

#[async_trait]
pub trait GhostApi: Send + Sync {
    /// Entities near `center`, or the most recent ones when `center` is `None`.
    async fn query_near(
        &self,
        center: Option<GeoPoint>,
        radius_m: f64,
        viewer_id: Option<&str>,
    ) -> Result<Vec<EntityRecord>>;

    async fn get_entity(&self, id: EntityId) -> Result<EntityRecord>;

    async fn create_entity(&self, prompt: &str, at: GeoPoint) -> Result<EntityRecord>;

    async fn report_interaction(&self, id: EntityId, action: &str, viewer_id: &str) -> Result<()>;

    async fn report_position(&self, viewer_id: &str, at: GeoPoint) -> Result<()>;
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

pub struct HttpGhostApi {
    base_url: String,
    http: reqwest::Client,
}

impl HttpGhostApi {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| WorldError::Config(format!("http client: {e}")))?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        entity: Option<EntityId>,
    ) -> Result<T> {
        let resp = req
            .send()
            .await
            .map_err(|e| WorldError::TransientQuery(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(map_status(status, entity, body));
        }

        resp.json::<T>()
            .await
            .map_err(|e| WorldError::TransientQuery(format!("invalid response body: {e}")))
    }
}

fn map_status(status: StatusCode, entity: Option<EntityId>, body: String) -> WorldError {
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);

    match (status, entity) {
        (StatusCode::NOT_FOUND, Some(id)) => WorldError::NotFound(id),
        (s, _) if s.is_client_error() => WorldError::Validation(message),
        (s, _) => WorldError::TransientQuery(format!("{s}: {message}")),
    }
}

#[async_trait]
impl GhostApi for HttpGhostApi {
    async fn query_near(
        &self,
        center: Option<GeoPoint>,
        radius_m: f64,
        viewer_id: Option<&str>,
    ) -> Result<Vec<EntityRecord>> {
        let query = NearQuery {
            lat: center.map(|c| c.lat),
            lng: center.map(|c| c.lng),
            radius: Some(radius_m),
            viewer_id: viewer_id.map(str::to_string),
        };
        let req = self.http.get(self.url(paths::ENTITIES)).query(&query);
        self.send(req, None).await
    }

    async fn get_entity(&self, id: EntityId) -> Result<EntityRecord> {
        let req = self.http.get(self.url(&paths::entity(id)));
        self.send(req, Some(id)).await
    }

    async fn create_entity(&self, prompt: &str, at: GeoPoint) -> Result<EntityRecord> {
        let body = CreateEntityRequest {
            prompt: Some(prompt.to_string()),
            lat: Some(at.lat),
            lng: Some(at.lng),
        };
        let req = self.http.post(self.url(paths::ENTITIES)).json(&body);
        self.send(req, None).await
    }

    async fn report_interaction(&self, id: EntityId, action: &str, viewer_id: &str) -> Result<()> {
        let body = InteractRequest {
            action: Some(action.to_string()),
            viewer_id: Some(viewer_id.to_string()),
        };
        let req = self.http.post(self.url(&paths::interact(id))).json(&body);
        let _: Ack = self.send(req, Some(id)).await?;
        Ok(())
    }

    async fn report_position(&self, viewer_id: &str, at: GeoPoint) -> Result<()> {
        let body = PositionReport::new(viewer_id, at);
        let req = self.http.post(self.url(paths::VIEWER_POSITION)).json(&body);
        let _: Ack = self.send(req, None).await?;
        Ok(())
    }
}
