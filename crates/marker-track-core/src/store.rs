//! In-memory marker record store.
//!
//! Records are kept in insertion order. An untracked record stays in the store
//! until it has been included in one published snapshot, so every consumer sees
//! the `tracked -> untracked` transition before the record disappears.

use std::collections::HashMap;

use nalgebra::Vector2;

use crate::{MarkerId, Pose, TrackedMarker};

#[derive(Clone, Debug)]
struct Record {
    marker: TrackedMarker,
    /// Set once the untracked state of this record went out in a snapshot.
    reported_untracked: bool,
}

/// What an `upsert` did to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
    /// The record had gone untracked and was brought back before removal.
    Revived,
}

/// Authoritative mapping from [`MarkerId`] to [`TrackedMarker`].
#[derive(Clone, Debug, Default)]
pub struct MarkerStore {
    records: Vec<Record>,
    index: HashMap<MarkerId, usize>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new tracked record or refresh an existing one.
    ///
    /// Pose, size and timestamp are always overwritten. The payload of an
    /// existing record is only filled in when it is still empty: the first
    /// non-empty payload seen for an id is kept for the record's lifetime.
    pub fn upsert(
        &mut self,
        id: &MarkerId,
        payload: &str,
        pose: Pose,
        size: Vector2<f32>,
        timestamp: f64,
    ) -> Upsert {
        if let Some(&idx) = self.index.get(id) {
            let record = &mut self.records[idx];
            let outcome = if record.marker.is_tracked {
                Upsert::Updated
            } else {
                Upsert::Revived
            };
            let marker = &mut record.marker;
            if marker.payload.is_empty() && !payload.is_empty() {
                marker.payload = payload.to_owned();
            }
            marker.pose = pose;
            marker.size = size;
            marker.last_seen_time = timestamp;
            marker.is_tracked = true;
            record.reported_untracked = false;
            return outcome;
        }

        self.index.insert(id.clone(), self.records.len());
        self.records.push(Record {
            marker: TrackedMarker {
                id: id.clone(),
                payload: payload.to_owned(),
                pose,
                size,
                last_seen_time: timestamp,
                is_tracked: true,
            },
            reported_untracked: false,
        });
        Upsert::Created
    }

    /// Flip every tracked record older than `timeout` to untracked.
    ///
    /// Returns the ids flipped by this call. Records that are already
    /// untracked are left alone, so repeated sweeps are idempotent.
    pub fn sweep_stale(&mut self, now: f64, timeout: f64) -> Vec<MarkerId> {
        let mut flipped = Vec::new();
        for record in &mut self.records {
            let marker = &mut record.marker;
            if marker.is_tracked && now - marker.last_seen_time > timeout {
                marker.is_tracked = false;
                flipped.push(marker.id.clone());
            }
        }
        flipped
    }

    /// Remove untracked records that already went out in a snapshot.
    pub fn purge_untracked(&mut self) -> Vec<MarkerId> {
        if !self.records.iter().any(|r| r.reported_untracked) {
            return Vec::new();
        }

        let mut removed = Vec::new();
        self.records.retain(|r| {
            if r.reported_untracked {
                removed.push(r.marker.id.clone());
                false
            } else {
                true
            }
        });
        self.reindex();
        removed
    }

    /// Record that every currently untracked marker has been published.
    pub fn mark_reported(&mut self) {
        for record in &mut self.records {
            if !record.marker.is_tracked {
                record.reported_untracked = true;
            }
        }
    }

    /// Copy of every record held, tracked and pending-removal alike.
    pub fn snapshot(&self) -> Vec<TrackedMarker> {
        self.records.iter().map(|r| r.marker.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&TrackedMarker> {
        self.index.get(id).map(|&idx| &self.records[idx].marker)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedMarker> {
        self.records.iter().map(|r| &r.marker)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn tracked_count(&self) -> usize {
        self.records.iter().filter(|r| r.marker.is_tracked).count()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (idx, record) in self.records.iter().enumerate() {
            self.index.insert(record.marker.id.clone(), idx);
        }
    }
}
