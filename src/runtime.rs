//! ClientRuntime – the viewer-side loop.
//!
//! ```text
//! ClientRuntime
//!   ├── report task ── PositionReporter ── POST /viewer/position
//!   ├── poll task ──── spawns poll_once ── GET /entities ── EntityReconciler
//!   └── tick task ──── tick ── CoordinateProjector + Engagement
//!                                              │
//!                                      mpsc<ClientEvent> ──▶ presentation
//! ```
//!
//! Only the poll path writes the entity set and only the tick path writes
//! mode and session state. Both go through one `parking_lot::Mutex` that is
//! never held across an `.await`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::GhostApi;
use crate::engagement::Engagement;
use crate::error::{Result, WorldError};
use crate::events::ClientEvent;
use crate::geo::CoordinateProjector;
use crate::protocol::EntityRecord;
use crate::proximity::{ProximityConfig, ProximityMode};
use crate::reconciler::{EntityReconciler, ReconcileDiff};
use crate::reporter::{PositionReporter, PositionSource};
use crate::session::{InteractionReporter, SessionState};
use crate::types::{ClientConfig, EntityId, GeoPoint};

// ---------------------------------------------------------------------------
// Interaction reporting
// ---------------------------------------------------------------------------

/// Forwards solved interactions to the API on a detached task.
struct ApiInteractionReporter {
    api: Arc<dyn GhostApi>,
    viewer_id: String,
}

impl InteractionReporter for ApiInteractionReporter {
    fn report(&self, entity_id: EntityId, action: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::warn!(
                "no async runtime, dropping '{}' report for entity {}",
                action,
                entity_id
            );
            return;
        };
        let api = self.api.clone();
        let viewer_id = self.viewer_id.clone();
        let action = action.to_string();
        handle.spawn(async move {
            if let Err(e) = api.report_interaction(entity_id, &action, &viewer_id).await {
                log::warn!("interaction report for entity {} failed: {}", entity_id, e);
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// The three scheduled loops. Each can be stopped on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientTask {
    Report,
    Poll,
    Tick,
}

struct RunningTask {
    kind: ClientTask,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct ClientState {
    reconciler: EntityReconciler,
    projector: CoordinateProjector,
    engagement: Engagement,
}

pub struct ClientRuntime {
    api: Arc<dyn GhostApi>,
    position: Arc<dyn PositionSource>,
    config: ClientConfig,
    viewer_id: String,
    state: Mutex<ClientState>,
    events: mpsc::UnboundedSender<ClientEvent>,
    next_sequence: AtomicU64,
    closed: AtomicBool,
    tasks: Mutex<Vec<RunningTask>>,
}

impl ClientRuntime {
    /// Build a runtime with a fresh v4 viewer id.
    pub fn new(
        api: Arc<dyn GhostApi>,
        position: Arc<dyn PositionSource>,
        config: ClientConfig,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<ClientEvent>)> {
        let viewer_id = uuid::Uuid::new_v4().to_string();
        Self::with_viewer_id(api, position, config, viewer_id)
    }

    pub fn with_viewer_id(
        api: Arc<dyn GhostApi>,
        position: Arc<dyn PositionSource>,
        config: ClientConfig,
        viewer_id: impl Into<String>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<ClientEvent>)> {
        config.validate()?;
        let viewer_id = viewer_id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut reconciler = EntityReconciler::new().with_stale_guard(config.ignore_stale_responses);
        let spawned = tx.clone();
        reconciler.on_spawned(move |e| {
            let _ = spawned.send(ClientEvent::EntitySpawned {
                record: e.record.clone(),
            });
        });
        let updated = tx.clone();
        reconciler.on_updated(move |e| {
            let _ = updated.send(ClientEvent::EntityUpdated {
                record: e.record.clone(),
            });
        });
        let despawned = tx.clone();
        reconciler.on_despawned(move |e| {
            let _ = despawned.send(ClientEvent::EntityDespawned { entity_id: e.id() });
        });

        let reporter = Arc::new(ApiInteractionReporter {
            api: api.clone(),
            viewer_id: viewer_id.clone(),
        });
        let engagement = Engagement::new(
            ProximityConfig {
                trigger_distance: config.trigger_distance,
                exit_distance: config.exit_distance,
            },
            reporter,
        )?;

        log::info!("client runtime created for viewer {}", viewer_id);

        let runtime = Arc::new(Self {
            api,
            position,
            config,
            viewer_id,
            state: Mutex::new(ClientState {
                reconciler,
                projector: CoordinateProjector::new(),
                engagement,
            }),
            events: tx,
            next_sequence: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });
        Ok((runtime, rx))
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Poll path
    // -----------------------------------------------------------------------

    /// Fetch the current snapshot and reconcile it.
    ///
    /// Returns `Ok(None)` when there is no position yet, when the runtime
    /// was shut down while the request was in flight, or when the stale
    /// guard dropped the response. On failure the local set is untouched and
    /// a [`ClientEvent::PollFailed`] is emitted.
    pub async fn poll_once(&self) -> Result<Option<ReconcileDiff>> {
        if self.is_closed() {
            return Ok(None);
        }
        let Some(center) = self.position.current() else {
            log::debug!("no viewer position yet, skipping poll");
            return Ok(None);
        };
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;

        let result = self
            .api
            .query_near(Some(center), self.config.fetch_radius_m, Some(self.viewer_id.as_str()))
            .await;

        if self.is_closed() {
            log::debug!("discarding poll #{} that completed after shutdown", sequence);
            return Ok(None);
        }

        match result {
            Ok(snapshot) => {
                // `shutdown` flips `closed` under this lock, so the check
                // below and the apply cannot straddle a teardown.
                let mut state = self.state.lock();
                if self.is_closed() {
                    log::debug!("discarding poll #{} that completed after shutdown", sequence);
                    return Ok(None);
                }
                Ok(state.reconciler.apply_response(sequence, &snapshot))
            }
            Err(e) => {
                log::warn!("poll #{} failed: {}", sequence, e);
                let _ = self.events.send(ClientEvent::PollFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Manual refresh outside the poll schedule.
    pub async fn refresh_now(&self) -> Result<Option<ReconcileDiff>> {
        self.poll_once().await
    }

    pub async fn fetch_entity(&self, id: EntityId) -> Result<EntityRecord> {
        self.api.get_entity(id).await
    }

    /// Ask the service to generate a new entity at the viewer's position.
    pub async fn create_entity_here(&self, prompt: &str) -> Result<EntityRecord> {
        let at = self
            .position
            .current()
            .ok_or_else(|| WorldError::validation("viewer position unknown"))?;
        self.api.create_entity(prompt, at).await
    }

    // -----------------------------------------------------------------------
    // Tick path
    // -----------------------------------------------------------------------

    /// Measure live distances and advance the proximity/interaction state.
    ///
    /// The projector reference is taken from the first viewer position seen.
    pub fn tick(&self) -> Vec<ClientEvent> {
        if self.is_closed() {
            return Vec::new();
        }
        let Some(viewer) = self.position.current() else {
            return Vec::new();
        };

        let mut guard = self.state.lock();
        if self.is_closed() {
            return Vec::new();
        }
        let state = &mut *guard;
        let here = state.projector.project_point(viewer);
        let distances = state.reconciler.measure(&mut state.projector, here);
        let events = state.engagement.tick(&state.reconciler, &distances);
        drop(guard);

        for event in &events {
            let _ = self.events.send(event.clone());
        }
        events
    }

    /// Submit an answer to the active riddle, if any.
    pub fn submit_answer(&self, text: &str) -> Option<ClientEvent> {
        let event = self.state.lock().engagement.submit_answer(text)?;
        let _ = self.events.send(event.clone());
        Some(event)
    }

    /// Override the projection reference.
    pub fn set_reference(&self, at: GeoPoint) {
        self.state.lock().projector.set_reference(at.lat, at.lng);
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn mode(&self) -> ProximityMode {
        self.state.lock().engagement.mode()
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.state.lock().engagement.session_state()
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.state.lock().reconciler.ids()
    }

    pub fn entity(&self, id: EntityId) -> Option<EntityRecord> {
        self.state
            .lock()
            .reconciler
            .get(id)
            .map(|local| local.record.clone())
    }

    pub fn live_distance(&self, id: EntityId) -> Option<f64> {
        self.state
            .lock()
            .reconciler
            .get(id)
            .and_then(|local| local.live_distance)
    }

    pub fn reference(&self) -> Option<GeoPoint> {
        self.state.lock().projector.reference()
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Spawn the report, poll and tick tasks.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            log::warn!("client runtime already started");
            return;
        }

        let (cancel, rx) = watch::channel(false);
        let reporter =
            PositionReporter::new(self.api.clone(), self.position.clone(), self.viewer_id.clone());
        tasks.push(RunningTask {
            kind: ClientTask::Report,
            cancel,
            handle: reporter.spawn(self.config.report_interval(), rx),
        });

        let (cancel, rx) = watch::channel(false);
        tasks.push(RunningTask {
            kind: ClientTask::Poll,
            cancel,
            handle: self.spawn_poll_loop(self.config.poll_interval(), rx),
        });

        let (cancel, rx) = watch::channel(false);
        tasks.push(RunningTask {
            kind: ClientTask::Tick,
            cancel,
            handle: self.spawn_tick_loop(self.config.tick_interval(), rx),
        });

        log::info!(
            "client runtime started (poll {:?}, report {:?}, tick {:?})",
            self.config.poll_interval(),
            self.config.report_interval(),
            self.config.tick_interval()
        );
    }

    fn spawn_poll_loop(
        self: &Arc<Self>,
        interval: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let runtime = self.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        // Each poll runs on its own so a slow response never
                        // delays the schedule.
                        let rt = runtime.clone();
                        tokio::spawn(async move {
                            let _ = rt.poll_once().await;
                        });
                    }
                    changed = cancel.changed() => {
                        if changed.is_err() || *cancel.borrow() {
                            break;
                        }
                    }
                }
            }
            log::debug!("poll loop stopped");
        })
    }

    fn spawn_tick_loop(
        self: &Arc<Self>,
        interval: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let runtime = self.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        runtime.tick();
                    }
                    changed = cancel.changed() => {
                        if changed.is_err() || *cancel.borrow() {
                            break;
                        }
                    }
                }
            }
            log::debug!("tick loop stopped");
        })
    }

    /// Stop a single task; the others keep running.
    pub async fn stop_task(&self, kind: ClientTask) {
        let task = {
            let mut tasks = self.tasks.lock();
            let Some(pos) = tasks.iter().position(|t| t.kind == kind) else {
                return;
            };
            tasks.swap_remove(pos)
        };
        let _ = task.cancel.send(true);
        if let Err(e) = task.handle.await {
            log::warn!("{:?} task ended abnormally: {}", kind, e);
        }
    }

    pub fn running_tasks(&self) -> Vec<ClientTask> {
        self.tasks.lock().iter().map(|t| t.kind).collect()
    }

    /// Stop every task and drop local state. In-flight poll responses that
    /// arrive afterwards are discarded.
    pub async fn shutdown(&self) {
        {
            let _state = self.state.lock();
            self.closed.store(true, Ordering::Release);
        }
        let tasks: Vec<RunningTask> = std::mem::take(&mut *self.tasks.lock());
        for task in &tasks {
            let _ = task.cancel.send(true);
        }
        for task in tasks {
            if let Err(e) = task.handle.await {
                log::warn!("{:?} task ended abnormally: {}", task.kind, e);
            }
        }

        let mut state = self.state.lock();
        state.engagement.reset();
        state.reconciler.clear();
        log::info!("client runtime for viewer {} shut down", self.viewer_id);
    }
}
