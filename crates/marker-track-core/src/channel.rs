//! Synchronous snapshot fan-out to subscribers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::TrackedMarker;

/// Immutable point-in-time list of every known marker, tracked or just lost.
///
/// Cloning is cheap; the marker list is shared. Consumers that need to edit
/// the data copy it out with [`MarkerSnapshot::to_vec`], which never touches
/// the engine's store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerSnapshot {
    /// Increments by one with every publish of the same engine.
    pub sequence: u64,
    /// Engine time of the publish, in seconds.
    pub published_at: f64,
    markers: Arc<[TrackedMarker]>,
}

impl MarkerSnapshot {
    pub fn new(sequence: u64, published_at: f64, markers: Vec<TrackedMarker>) -> Self {
        Self {
            sequence,
            published_at,
            markers: markers.into(),
        }
    }

    #[inline]
    pub fn markers(&self) -> &[TrackedMarker] {
        &self.markers
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackedMarker> {
        self.markers.iter()
    }

    pub fn tracked(&self) -> impl Iterator<Item = &TrackedMarker> {
        self.markers.iter().filter(|m| m.is_tracked)
    }

    pub fn untracked(&self) -> impl Iterator<Item = &TrackedMarker> {
        self.markers.iter().filter(|m| !m.is_tracked)
    }

    pub fn get(&self, id: &str) -> Option<&TrackedMarker> {
        self.markers.iter().find(|m| m.id.as_str() == id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn to_vec(&self) -> Vec<TrackedMarker> {
        self.markers.to_vec()
    }
}

impl<'a> IntoIterator for &'a MarkerSnapshot {
    type Item = &'a TrackedMarker;
    type IntoIter = std::slice::Iter<'a, TrackedMarker>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Token returned by `subscribe`; pass it back to `unsubscribe`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use = "dropping the handle makes it impossible to unsubscribe"]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    #[inline]
    pub fn id(self) -> u64 {
        self.0
    }
}

pub type SnapshotCallback = Box<dyn FnMut(&MarkerSnapshot) + Send>;

/// Registry of snapshot subscribers.
///
/// Delivery is synchronous: `publish` returns after every subscriber ran.
#[derive(Default)]
pub struct ChangeChannel {
    next_id: u64,
    subscribers: Vec<(SubscriptionHandle, SnapshotCallback)>,
}

impl ChangeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionHandle
    where
        F: FnMut(&MarkerSnapshot) + Send + 'static,
    {
        let handle = SubscriptionHandle(self.next_id);
        self.next_id += 1;
        self.subscribers.push((handle, Box::new(callback)));
        handle
    }

    /// Returns `false` if the handle was unknown or already released.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(h, _)| *h != handle);
        self.subscribers.len() != before
    }

    pub fn publish(&mut self, snapshot: &MarkerSnapshot) {
        for (_, callback) in &mut self.subscribers {
            callback(snapshot);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}

impl std::fmt::Debug for ChangeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeChannel")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
