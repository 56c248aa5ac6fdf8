//! Ghost World
//!
//! Location-based AR entity service and the viewer-side runtime that
//! consumes it.
//!
//! ## Architecture
//!
//! ```text
//! server                                  client
//! ──────                                  ──────
//! http::router  (http.rs)                 ClientRuntime  (runtime.rs)
//!   ├── GeoQueryService  (service.rs)       ├── GhostApi / HttpGhostApi  (api.rs)
//!   │     └── haversine  (geo.rs)           ├── PositionReporter  (reporter.rs)
//!   ├── ContentGenerator (generator.rs)     ├── EntityReconciler  (reconciler.rs)
//!   └── ViewerRegistry   (viewers.rs)       ├── CoordinateProjector  (geo.rs)
//!                                           └── Engagement  (engagement.rs)
//!                                                 ├── ProximityStateMachine  (proximity.rs)
//!                                                 └── InteractionSession  (session.rs)
//! ```
//!
//! Wire types live in [`protocol`]; both halves share [`types`] and
//! [`error`]. The client logic (reconciliation, projection, hysteresis and
//! the riddle session) is plain synchronous code and is always compiled.

// Shared types and pure client logic are always available.
pub mod engagement;
pub mod error;
pub mod events;
pub mod geo;
pub mod protocol;
pub mod proximity;
pub mod reconciler;
pub mod session;
pub mod types;

// Server-side modules require the `server` feature.
#[cfg(feature = "server")]
pub mod generator;
#[cfg(feature = "server")]
pub mod http;
#[cfg(feature = "server")]
pub mod service;
#[cfg(feature = "server")]
pub mod viewers;

// Networked client modules require the `client` feature.
#[cfg(feature = "client")]
pub mod api;
#[cfg(feature = "client")]
pub mod reporter;
#[cfg(feature = "client")]
pub mod runtime;

pub use engagement::Engagement;
pub use error::{Result, WorldError};
pub use events::ClientEvent;
pub use geo::{haversine_m, CoordinateProjector};
pub use protocol::EntityRecord;
pub use proximity::{ModeTransition, ProximityConfig, ProximityMode, ProximityStateMachine};
pub use reconciler::{reconcile, EntityReconciler, LocalEntity, ReconcileDiff};
pub use session::{AnswerOutcome, InteractionReporter, InteractionSession, Prompt, SessionState};
pub use types::{ClientConfig, Entity, EntityId, GeoPoint, Interaction, LocalPoint, ServiceConfig};

#[cfg(feature = "server")]
pub use generator::{ChatCompletionsGenerator, ContentGenerator, GeneratedEntity, OfflineGenerator};
#[cfg(feature = "server")]
pub use http::{router, AppState};
#[cfg(feature = "server")]
pub use service::GeoQueryService;
#[cfg(feature = "server")]
pub use viewers::ViewerRegistry;

#[cfg(feature = "client")]
pub use api::{GhostApi, HttpGhostApi};
#[cfg(feature = "client")]
pub use reporter::{PositionReporter, PositionSource, SharedPosition};
#[cfg(feature = "client")]
pub use runtime::{ClientRuntime, ClientTask};
