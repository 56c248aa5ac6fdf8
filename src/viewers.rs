//! Last-known viewer positions with TTL eviction.
//!
//! Positions are upserted by `POST /viewer/position` and evicted by a sweep
//! task running on its own timer, independent of query handling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::types::{GeoPoint, ViewerPosition};

#[derive(Debug, Default)]
pub struct ViewerRegistry {
    viewers: RwLock<HashMap<String, ViewerPosition>>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, viewer_id: &str, point: GeoPoint) -> ViewerPosition {
        self.upsert_at(viewer_id, point, Utc::now())
    }

    pub fn upsert_at(&self, viewer_id: &str, point: GeoPoint, now: DateTime<Utc>) -> ViewerPosition {
        let position = ViewerPosition {
            viewer_id: viewer_id.to_string(),
            lat: point.lat,
            lng: point.lng,
            updated_at: now,
        };
        self.viewers
            .write()
            .insert(position.viewer_id.clone(), position.clone());
        position
    }

    /// Viewers seen within `ttl` of `now`, most recent first.
    pub fn active(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<ViewerPosition> {
        let cutoff = cutoff(now, ttl);
        let mut out: Vec<ViewerPosition> = self
            .viewers
            .read()
            .values()
            .filter(|v| v.updated_at >= cutoff)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.viewer_id.cmp(&b.viewer_id))
        });
        out
    }

    /// Drop every viewer older than `ttl`. Returns how many were evicted.
    pub fn sweep_expired(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let cutoff = cutoff(now, ttl);
        let mut viewers = self.viewers.write();
        let before = viewers.len();
        viewers.retain(|_, v| v.updated_at >= cutoff);
        before - viewers.len()
    }

    pub fn len(&self) -> usize {
        self.viewers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.read().is_empty()
    }
}

fn cutoff(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Spawn the periodic eviction task. It exits once `shutdown` flips to true.
pub fn spawn_sweeper(
    registry: Arc<ViewerRegistry>,
    interval: Duration,
    ttl: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let evicted = registry.sweep_expired(Utc::now(), ttl);
                    if evicted > 0 {
                        log::debug!("evicted {} stale viewer(s), {} remain", evicted, registry.len());
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::debug!("viewer sweeper stopping");
                        break;
                    }
                }
            }
        }
    })
}
