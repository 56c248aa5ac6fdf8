//! Content generation for new entities.
//!
//! The generator is an opaque collaborator: given a prompt and the requested
//! location it returns a loosely-typed [`GeneratedEntity`]. The service
//! validates and normalises that payload before anything is persisted.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, WorldError};
use crate::types::{GeneratorConfig, GeoPoint, Interaction, DEFAULT_VISIBILITY_RADIUS_M};

pub const SYSTEM_PROMPT: &str = "You are a Ghost Creator for an AR app. Generate ghost JSON with: \
name, personality, location {lat, lng}, visibility_radius_m, and interaction \
{type, riddle, correct_answer, reward {type, value}}.";

// ---------------------------------------------------------------------------
// Generator output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PartialLocation {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

/// Raw generator payload. Every field is optional; the service fills or
/// rejects what is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedEntity {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub location: Option<PartialLocation>,
    /// Numbers, numeric strings or garbage; see [`visibility_radius_m`](Self::visibility_radius_m).
    #[serde(default)]
    pub visibility_radius_m: Option<Value>,
    #[serde(default)]
    pub interaction: Option<Value>,
}

impl GeneratedEntity {
    /// Fill any missing location component from the request coordinates.
    pub fn with_request_defaults(mut self, lat: f64, lng: f64) -> Self {
        let loc = self.location.get_or_insert_with(PartialLocation::default);
        loc.lat.get_or_insert(lat);
        loc.lng.get_or_insert(lng);
        self
    }

    /// The usable location, or a validation error.
    pub fn location(&self) -> Result<GeoPoint> {
        let loc = self
            .location
            .as_ref()
            .ok_or_else(|| WorldError::validation("generated entity has no location"))?;
        match (loc.lat, loc.lng) {
            (Some(lat), Some(lng)) => {
                let point = GeoPoint::new(lat, lng);
                if point.is_valid() {
                    Ok(point)
                } else {
                    Err(WorldError::validation(format!(
                        "generated location {point} is out of range"
                    )))
                }
            }
            _ => Err(WorldError::validation("generated location is incomplete")),
        }
    }

    /// Positive radius in metres; anything else falls back to the default.
    pub fn visibility_radius_m(&self) -> f64 {
        let parsed = match &self.visibility_radius_m {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(DEFAULT_VISIBILITY_RADIUS_M)
    }

    /// The interaction descriptor if it has the expected shape.
    pub fn interaction(&self) -> Option<Interaction> {
        let value = self.interaction.as_ref()?;
        match serde_json::from_value::<Interaction>(value.clone()) {
            Ok(i) => Some(i),
            Err(e) => {
                log::warn!("discarding malformed generated interaction: {}", e);
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Generator trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produce a new entity for `prompt` near `(lat, lng)`.
    ///
    /// Implementations apply [`GeneratedEntity::with_request_defaults`].
    async fn generate(&self, prompt: &str, lat: f64, lng: f64) -> Result<GeneratedEntity>;

    fn name(&self) -> &'static str;
}

/// Deterministic generator used when no model endpoint is configured.
#[derive(Debug, Default, Clone)]
pub struct OfflineGenerator;

#[async_trait]
impl ContentGenerator for OfflineGenerator {
    async fn generate(&self, prompt: &str, lat: f64, lng: f64) -> Result<GeneratedEntity> {
        Ok(GeneratedEntity {
            name: Some("Test Ghost".into()),
            personality: Some("Friendly".into()),
            location: None,
            visibility_radius_m: Some(json!(DEFAULT_VISIBILITY_RADIUS_M)),
            interaction: Some(json!({ "type": "message", "text": prompt })),
        }
        .with_request_defaults(lat, lng))
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

// ---------------------------------------------------------------------------
// Chat-completions generator
// ---------------------------------------------------------------------------

/// Generator backed by an OpenAI-compatible chat-completions deployment.
pub struct ChatCompletionsGenerator {
    config: GeneratorConfig,
    http: reqwest::Client,
}

impl ChatCompletionsGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WorldError::Config(format!("generator http client: {e}")))?;
        Ok(Self { config, http })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.deployment,
            self.config.api_version
        )
    }
}

/// Pull the JSON object out of a chat-completions reply.
pub fn parse_completion(reply: &Value) -> Result<GeneratedEntity> {
    let content = reply
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| WorldError::Generator("no content in completion".into()))?;
    serde_json::from_str(content)
        .map_err(|e| WorldError::Generator(format!("unparsable generator payload: {e}")))
}

#[async_trait]
impl ContentGenerator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &str, lat: f64, lng: f64) -> Result<GeneratedEntity> {
        let body = json!({
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!("Create a ghost at lat={lat}, lng={lng}. User request: {prompt}")
                }
            ],
            "response_format": { "type": "json_object" }
        });

        let resp = self
            .http
            .post(self.url())
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| WorldError::Generator(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(WorldError::Generator(format!("generator returned {status}")));
        }

        let reply: Value = resp
            .json()
            .await
            .map_err(|e| WorldError::Generator(format!("invalid reply body: {e}")))?;

        Ok(parse_completion(&reply)?.with_request_defaults(lat, lng))
    }

    fn name(&self) -> &'static str {
        "chat-completions"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
