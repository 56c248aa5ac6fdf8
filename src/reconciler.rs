//! `EntityReconciler` – local mirror of the entities near the viewer.
//!
//! Each successful poll delivers a full snapshot of server truth. The
//! reconciler diffs it against the local set and turns the difference into
//! spawn / update / despawn events, so the presentation layer only ever sees
//! incremental changes.
//!
//! Invariant: after [`EntityReconciler::poll`] returns, the local key set is
//! exactly the id set of the snapshot just applied. An id never spawns twice
//! without an intervening despawn, and an updated entity keeps its local slot
//! (the `LocalEntity` is mutated in place, never replaced).
//!
//! The reconciler does not schedule anything. The client runtime drives it
//! from its poll timer and only calls it with snapshots that arrived intact;
//! failed polls never reach this module.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::geo::CoordinateProjector;
use crate::protocol::EntityRecord;
use crate::types::{EntityId, LocalPoint};

// ---------------------------------------------------------------------------
// Local entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LocalEntity {
    /// Last record received from the server.
    pub record: EntityRecord,
    /// Distance to the viewer measured on the most recent tick.
    pub live_distance: Option<f64>,
    /// Poll sequence that spawned this entity.
    pub spawned_in: u64,
    /// How many in-place updates this entity has received.
    pub updates: u32,
}

impl LocalEntity {
    fn spawn(record: EntityRecord, sequence: u64) -> Self {
        Self {
            record,
            live_distance: None,
            spawned_in: sequence,
            updates: 0,
        }
    }

    pub fn id(&self) -> EntityId {
        self.record.id
    }
}

// ---------------------------------------------------------------------------
// Pure diff
// ---------------------------------------------------------------------------

/// Result of diffing a snapshot against the previous local set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileDiff {
    /// Records whose id was not present before, in snapshot order.
    pub spawned: Vec<EntityRecord>,
    /// Records whose id was already present, in snapshot order.
    pub updated: Vec<EntityRecord>,
    /// Ids that are no longer present, ascending.
    pub despawned: Vec<EntityId>,
}

impl ReconcileDiff {
    pub fn is_empty(&self) -> bool {
        self.spawned.is_empty() && self.updated.is_empty() && self.despawned.is_empty()
    }
}

/// Diff `snapshot` against the keys of `previous`.
///
/// Duplicate ids inside one snapshot collapse to their last occurrence.
pub fn reconcile<V>(previous: &HashMap<EntityId, V>, snapshot: &[EntityRecord]) -> ReconcileDiff {
    let mut latest: Vec<&EntityRecord> = Vec::with_capacity(snapshot.len());
    let mut slot: HashMap<EntityId, usize> = HashMap::with_capacity(snapshot.len());
    for record in snapshot {
        match slot.entry(record.id) {
            Entry::Occupied(e) => latest[*e.get()] = record,
            Entry::Vacant(v) => {
                v.insert(latest.len());
                latest.push(record);
            }
        }
    }

    let mut diff = ReconcileDiff::default();
    for record in latest {
        if previous.contains_key(&record.id) {
            diff.updated.push(record.clone());
        } else {
            diff.spawned.push(record.clone());
        }
    }

    let incoming: HashSet<EntityId> = slot.into_keys().collect();
    diff.despawned = previous
        .keys()
        .filter(|id| !incoming.contains(id))
        .copied()
        .collect();
    diff.despawned.sort_unstable();

    diff
}

// ---------------------------------------------------------------------------
// Stateful reconciler
// ---------------------------------------------------------------------------

pub type EntityCallback = Box<dyn FnMut(&LocalEntity) + Send>;

/// Stateful reconciler with spawn / update / despawn callbacks.
#[derive(Default)]
pub struct EntityReconciler {
    entities: HashMap<EntityId, LocalEntity>,
    /// Reject responses whose sequence is not newer than the last applied one.
    ignore_stale: bool,
    /// Sequence of the most recently applied snapshot.
    last_applied: u64,
    /// Number of snapshots applied so far.
    applied: u64,

    on_spawned: Option<EntityCallback>,
    on_updated: Option<EntityCallback>,
    on_despawned: Option<EntityCallback>,
}

impl std::fmt::Debug for EntityReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityReconciler")
            .field("entities", &self.entities.len())
            .field("ignore_stale", &self.ignore_stale)
            .field("last_applied", &self.last_applied)
            .field("applied", &self.applied)
            .finish()
    }
}

impl EntityReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the stale-response guard used by [`apply_response`](Self::apply_response).
    ///
    /// Off by default: responses are applied in the order they are received,
    /// so a slow older response can overwrite a newer one.
    pub fn with_stale_guard(mut self, enabled: bool) -> Self {
        self.ignore_stale = enabled;
        self
    }

    // -----------------------------------------------------------------------
    // Callback registration
    // -----------------------------------------------------------------------

    pub fn on_spawned(&mut self, cb: impl FnMut(&LocalEntity) + Send + 'static) {
        self.on_spawned = Some(Box::new(cb));
    }

    pub fn on_updated(&mut self, cb: impl FnMut(&LocalEntity) + Send + 'static) {
        self.on_updated = Some(Box::new(cb));
    }

    pub fn on_despawned(&mut self, cb: impl FnMut(&LocalEntity) + Send + 'static) {
        self.on_despawned = Some(Box::new(cb));
    }

    // -----------------------------------------------------------------------
    // Applying snapshots
    // -----------------------------------------------------------------------

    /// Apply a snapshot unconditionally and fire callbacks.
    pub fn poll(&mut self, snapshot: &[EntityRecord]) -> ReconcileDiff {
        let sequence = self.last_applied + 1;
        self.apply(sequence, snapshot)
    }

    /// Apply the response to the poll issued with `sequence`.
    ///
    /// Returns `None` when the stale guard is enabled and a newer response
    /// has already been applied.
    pub fn apply_response(
        &mut self,
        sequence: u64,
        snapshot: &[EntityRecord],
    ) -> Option<ReconcileDiff> {
        if self.ignore_stale && self.applied > 0 && sequence <= self.last_applied {
            log::debug!(
                "dropping stale poll response #{} (last applied #{})",
                sequence,
                self.last_applied
            );
            return None;
        }
        Some(self.apply(sequence, snapshot))
    }

    fn apply(&mut self, sequence: u64, snapshot: &[EntityRecord]) -> ReconcileDiff {
        let diff = reconcile(&self.entities, snapshot);

        for id in &diff.despawned {
            if let Some(gone) = self.entities.remove(id) {
                if let Some(cb) = self.on_despawned.as_mut() {
                    cb(&gone);
                }
            }
        }

        for record in &diff.updated {
            if let Some(local) = self.entities.get_mut(&record.id) {
                local.record = record.clone();
                local.updates += 1;
                if let Some(cb) = self.on_updated.as_mut() {
                    cb(local);
                }
            }
        }

        for record in &diff.spawned {
            let local = self
                .entities
                .entry(record.id)
                .or_insert_with(|| LocalEntity::spawn(record.clone(), sequence));
            if let Some(cb) = self.on_spawned.as_mut() {
                cb(local);
            }
        }

        self.last_applied = sequence;
        self.applied += 1;

        log::debug!(
            "poll #{}: {} spawned, {} updated, {} despawned ({} local)",
            sequence,
            diff.spawned.len(),
            diff.updated.len(),
            diff.despawned.len(),
            self.entities.len()
        );

        diff
    }

    // -----------------------------------------------------------------------
    // Live distances
    // -----------------------------------------------------------------------

    /// Measure every entity against the viewer's local position.
    ///
    /// Updates the derived `live_distance` of each entity and returns the
    /// `(id, distance)` pairs, ascending by id.
    pub fn measure(
        &mut self,
        projector: &mut CoordinateProjector,
        viewer: LocalPoint,
    ) -> Vec<(EntityId, f64)> {
        let mut out: Vec<(EntityId, f64)> = self
            .entities
            .values_mut()
            .map(|local| {
                let at = projector.project_point(local.record.location);
                let d = at.distance_to(&viewer);
                local.live_distance = Some(d);
                (local.record.id, d)
            })
            .collect();
        out.sort_unstable_by_key(|(id, _)| *id);
        out
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, id: EntityId) -> Option<&LocalEntity> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    pub fn entities(&self) -> impl Iterator<Item = &LocalEntity> {
        self.entities.values()
    }

    /// Drop all local state without firing callbacks (teardown).
    pub fn clear(&mut self) {
        self.entities.clear();
        self.last_applied = 0;
        self.applied = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;
    use std::sync::{Arc, Mutex};

    fn record(id: EntityId, name: &str) -> EntityRecord {
        EntityRecord {
            id,
            name: name.into(),
            personality: String::new(),
            location: GeoPoint::new(37.7749, -122.4194),
            visibility_radius_m: 100.0,
            interaction: None,
            interaction_count: 0,
            created_at: None,
            distance: None,
        }
    }

    fn snapshot(ids: &[EntityId]) -> Vec<EntityRecord> {
        ids.iter().map(|id| record(*id, &format!("g{id}"))).collect()
    }

    #[derive(Default)]
    struct Counts {
        spawned: HashMap<EntityId, u32>,
        updated: HashMap<EntityId, u32>,
        despawned: HashMap<EntityId, u32>,
    }

    fn counting() -> (EntityReconciler, Arc<Mutex<Counts>>) {
        let counts = Arc::new(Mutex::new(Counts::default()));
        let mut r = EntityReconciler::new();
        let c = counts.clone();
        r.on_spawned(move |e| *c.lock().unwrap().spawned.entry(e.id()).or_default() += 1);
        let c = counts.clone();
        r.on_updated(move |e| *c.lock().unwrap().updated.entry(e.id()).or_default() += 1);
        let c = counts.clone();
        r.on_despawned(move |e| *c.lock().unwrap().despawned.entry(e.id()).or_default() += 1);
        (r, counts)
    }

    // ---------------------------------------------------------------
    // Pure diff
    // ---------------------------------------------------------------

    #[test]
    fn diff_splits_into_three_sets() {
        let mut prev: HashMap<EntityId, ()> = HashMap::new();
        prev.insert(1, ());
        prev.insert(2, ());

        let diff = reconcile(&prev, &snapshot(&[2, 3]));
        assert_eq!(diff.spawned.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3]);
        assert_eq!(diff.updated.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(diff.despawned, vec![1]);
    }

    #[test]
    fn diff_of_identical_sets_only_updates() {
        let mut prev: HashMap<EntityId, ()> = HashMap::new();
        prev.insert(5, ());
        let diff = reconcile(&prev, &snapshot(&[5]));
        assert!(diff.spawned.is_empty());
        assert!(diff.despawned.is_empty());
        assert_eq!(diff.updated.len(), 1);
    }

    #[test]
    fn duplicate_ids_collapse_to_last_occurrence() {
        let prev: HashMap<EntityId, ()> = HashMap::new();
        let snap = vec![record(1, "first"), record(2, "b"), record(1, "second")];
        let diff = reconcile(&prev, &snap);
        assert_eq!(diff.spawned.len(), 2);
        assert_eq!(diff.spawned[0].id, 1);
        assert_eq!(diff.spawned[0].name, "second");
    }

    // ---------------------------------------------------------------
    // Stateful sequence
    // ---------------------------------------------------------------

    #[test]
    fn overlapping_snapshots_fire_each_event_once() {
        let (mut r, counts) = counting();

        r.poll(&snapshot(&[1, 2, 3])); // A
        r.poll(&snapshot(&[2, 3, 4])); // B
        r.poll(&snapshot(&[3, 4, 5])); // C
        r.poll(&snapshot(&[1, 5])); // D: 1 comes back

        let c = counts.lock().unwrap();
        assert_eq!(c.spawned.get(&1), Some(&2)); // A, D (despawned in between)
        assert_eq!(c.spawned.get(&2), Some(&1));
        assert_eq!(c.spawned.get(&3), Some(&1));
        assert_eq!(c.spawned.get(&4), Some(&1));
        assert_eq!(c.spawned.get(&5), Some(&1));

        assert_eq!(c.despawned.get(&1), Some(&1));
        assert_eq!(c.despawned.get(&2), Some(&1));
        assert_eq!(c.despawned.get(&3), Some(&1));
        assert_eq!(c.despawned.get(&4), Some(&1));
        assert_eq!(c.despawned.get(&5), None);

        assert_eq!(c.updated.get(&3), Some(&2)); // B, C
        assert_eq!(c.updated.get(&5), Some(&1)); // D
        drop(c);

        assert_eq!(r.ids(), vec![1, 5]);
    }

    #[test]
    fn key_set_matches_latest_snapshot() {
        let mut r = EntityReconciler::new();
        r.poll(&snapshot(&[10, 20, 30]));
        assert_eq!(r.ids(), vec![10, 20, 30]);
        r.poll(&snapshot(&[]));
        assert_eq!(r.entity_count(), 0);
        r.poll(&snapshot(&[20]));
        assert_eq!(r.ids(), vec![20]);
    }

    #[test]
    fn update_mutates_in_place() {
        let mut r = EntityReconciler::new();
        r.poll(&snapshot(&[1]));
        let spawned_in = r.get(1).unwrap().spawned_in;

        let mut renamed = record(1, "renamed");
        renamed.interaction_count = 4;
        r.poll(&[renamed]);

        let local = r.get(1).unwrap();
        assert_eq!(local.record.name, "renamed");
        assert_eq!(local.record.interaction_count, 4);
        assert_eq!(local.spawned_in, spawned_in);
        assert_eq!(local.updates, 1);
    }

    // ---------------------------------------------------------------
    // Ordering policy
    // ---------------------------------------------------------------

    #[test]
    fn last_received_wins_by_default() {
        let mut r = EntityReconciler::new();
        // Poll #2 answers first, then the slower poll #1 arrives.
        r.apply_response(2, &snapshot(&[2]));
        let diff = r.apply_response(1, &snapshot(&[1]));
        assert!(diff.is_some());
        assert_eq!(r.ids(), vec![1]);
    }

    #[test]
    fn stale_guard_drops_older_responses() {
        let mut r = EntityReconciler::new().with_stale_guard(true);
        r.apply_response(2, &snapshot(&[2]));
        assert!(r.apply_response(1, &snapshot(&[1])).is_none());
        assert_eq!(r.ids(), vec![2]);
        assert!(r.apply_response(3, &snapshot(&[3])).is_some());
        assert_eq!(r.ids(), vec![3]);
    }

    // ---------------------------------------------------------------
    // Live distances
    // ---------------------------------------------------------------

    #[test]
    fn measure_updates_live_distance() {
        let mut r = EntityReconciler::new();
        let mut near = record(1, "near");
        near.location = GeoPoint::new(37.7749, -122.4194);
        let mut far = record(2, "far");
        far.location = GeoPoint::new(37.7759, -122.4194);
        r.poll(&[near, far]);

        let mut projector = CoordinateProjector::with_reference(GeoPoint::new(37.7749, -122.4194));
        let d = r.measure(&mut projector, LocalPoint::origin());
        assert_eq!(d.len(), 2);
        assert_eq!(d[0], (1, 0.0));
        assert!((d[1].1 - 111.19).abs() < 0.1);
        assert_eq!(r.get(2).unwrap().live_distance, Some(d[1].1));
    }

    #[test]
    fn clear_resets_everything() {
        let mut r = EntityReconciler::new();
        r.poll(&snapshot(&[1, 2]));
        r.clear();
        assert_eq!(r.entity_count(), 0);
        assert_eq!(r.last_applied(), 0);
    }
}
