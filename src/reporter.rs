//! Periodic viewer-position reporting.
//!
//! The location provider is outside this crate; it writes into a
//! [`SharedPosition`] (or implements [`PositionSource`] directly) and the
//! reporter publishes whatever is current on every interval. Failures are
//! logged and otherwise ignored.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::GhostApi;
use crate::types::GeoPoint;

/// Anything that can say where the viewer is right now.
pub trait PositionSource: Send + Sync {
    fn current(&self) -> Option<GeoPoint>;
}

/// Latest-value position cell written by the location provider.
#[derive(Debug, Clone, Default)]
pub struct SharedPosition {
    inner: Arc<RwLock<Option<GeoPoint>>>,
}

impl SharedPosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(point: GeoPoint) -> Self {
        let shared = Self::default();
        shared.set(point);
        shared
    }

    pub fn set(&self, point: GeoPoint) {
        *self.inner.write() = Some(point);
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

impl PositionSource for SharedPosition {
    fn current(&self) -> Option<GeoPoint> {
        *self.inner.read()
    }
}

pub struct PositionReporter {
    api: Arc<dyn GhostApi>,
    source: Arc<dyn PositionSource>,
    viewer_id: String,
}

impl PositionReporter {
    pub fn new(
        api: Arc<dyn GhostApi>,
        source: Arc<dyn PositionSource>,
        viewer_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            source,
            viewer_id: viewer_id.into(),
        }
    }

    /// Send one report. Returns whether a report was actually delivered.
    pub async fn report_once(&self) -> bool {
        let Some(at) = self.source.current() else {
            log::trace!("no position yet, skipping report");
            return false;
        };
        match self.api.report_position(&self.viewer_id, at).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("position report failed: {}", e);
                false
            }
        }
    }

    /// Report every `interval` until `shutdown` flips to true.
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        self.report_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            log::debug!("position reporter for {} stopped", self.viewer_id);
        })
    }
}
