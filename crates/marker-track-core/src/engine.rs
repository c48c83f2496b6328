//! Reconciliation engine: merges detections into the store and owns the
//! publish cadence.
//!
//! Detections are applied as they arrive but never publish on their own.
//! Publishing happens from [`MarkerTracker::tick`], at most once per
//! `min_publish_interval`. Each publish:
//!
//! 1. drops the records whose untracked state went out in the previous snapshot,
//! 2. flips stale records to untracked,
//! 3. delivers the full snapshot to every subscriber,
//! 4. remembers which untracked records have now been reported.

use log::{debug, trace};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    ChangeChannel, ConfigError, Detection, MarkerSnapshot, MarkerStore, SubscriptionHandle,
    TrackerConfig, TrackedMarker, Upsert,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Updating,
}

/// Per-batch intake counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub created: usize,
    pub updated: usize,
    pub dropped: usize,
}

impl IngestStats {
    #[inline]
    pub fn applied(&self) -> usize {
        self.created + self.updated
    }
}

/// Marker reconciliation engine.
///
/// All mutation goes through `&mut self`, so one owner drives intake, ticks
/// and subscription changes from a single scheduling context.
#[derive(Debug)]
pub struct MarkerTracker {
    config: TrackerConfig,
    store: MarkerStore,
    channel: ChangeChannel,
    state: EngineState,
    last_publish_time: Option<f64>,
    next_sequence: u64,
}

impl MarkerTracker {
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            store: MarkerStore::new(),
            channel: ChangeChannel::new(),
            state: EngineState::Idle,
            last_publish_time: None,
            next_sequence: 0,
        })
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &MarkerStore {
        &self.store
    }

    #[inline]
    pub fn state(&self) -> EngineState {
        self.state
    }

    #[inline]
    pub fn last_publish_time(&self) -> Option<f64> {
        self.last_publish_time
    }

    /// Apply one detection. Malformed detections are dropped.
    ///
    /// Returns the store outcome, or `None` when the detection was dropped.
    pub fn report_detection(&mut self, detection: Detection) -> Option<Upsert> {
        self.state = EngineState::Updating;
        let outcome = self.apply(&detection);
        self.state = EngineState::Idle;
        outcome
    }

    /// Apply a batch of detections in order. A malformed detection only
    /// affects itself.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn ingest<I>(&mut self, batch: I) -> IngestStats
    where
        I: IntoIterator<Item = Detection>,
    {
        self.state = EngineState::Updating;
        let mut stats = IngestStats::default();
        for detection in batch {
            match self.apply(&detection) {
                Some(Upsert::Created) => stats.created += 1,
                Some(Upsert::Updated | Upsert::Revived) => stats.updated += 1,
                None => stats.dropped += 1,
            }
        }
        self.state = EngineState::Idle;
        stats
    }

    fn apply(&mut self, detection: &Detection) -> Option<Upsert> {
        let Some(pose) = detection.validated_pose() else {
            debug!(
                "dropping malformed detection for marker '{}' at t={}",
                detection.id, detection.timestamp
            );
            return None;
        };
        let outcome = self.store.upsert(
            &detection.id,
            &detection.payload,
            pose,
            detection.size,
            detection.timestamp,
        );
        if outcome != Upsert::Updated {
            debug!("marker '{}' {:?}", detection.id, outcome);
        }
        Some(outcome)
    }

    /// Whether a tick at `now` would publish.
    pub fn publish_due(&self, now: f64) -> bool {
        match self.last_publish_time {
            None => true,
            Some(last) => now - last > self.config.min_publish_interval,
        }
    }

    /// Periodic driver, called from the host's update loop.
    ///
    /// Returns the published snapshot, or `None` when the publish interval
    /// has not elapsed yet.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn tick(&mut self, now: f64) -> Option<MarkerSnapshot> {
        if !self.publish_due(now) {
            return None;
        }

        self.state = EngineState::Updating;
        let purged = self.store.purge_untracked();
        let lost = self
            .store
            .sweep_stale(now, self.config.tracking_lost_timeout);
        for id in &lost {
            debug!("marker '{id}' lost at t={now}");
        }

        let snapshot = MarkerSnapshot::new(self.next_sequence, now, self.store.snapshot());
        self.next_sequence += 1;
        self.store.mark_reported();
        self.last_publish_time = Some(now);
        self.state = EngineState::Idle;

        trace!(
            "publish #{} at t={now}: {} markers ({} lost, {} purged), {} subscribers",
            snapshot.sequence,
            snapshot.len(),
            lost.len(),
            purged.len(),
            self.channel.len()
        );
        self.channel.publish(&snapshot);
        Some(snapshot)
    }

    /// Current store contents without publishing or sweeping.
    pub fn peek(&self) -> Vec<TrackedMarker> {
        self.store.snapshot()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionHandle
    where
        F: FnMut(&MarkerSnapshot) + Send + 'static,
    {
        self.channel.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        self.channel.unsubscribe(handle)
    }

    #[inline]
    pub fn subscriber_count(&self) -> usize {
        self.channel.len()
    }

    /// Release every subscriber; later ticks still reconcile but deliver to no one.
    pub fn shutdown(&mut self) {
        self.channel.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MarkerId, Pose};
    use nalgebra::{Vector2, Vector3};

    fn det(id: &str, x: f32, t: f64) -> Detection {
        Detection::new(
            id,
            id,
            Pose::from_position(Vector3::new(x, 0.0, 0.0)),
            Vector2::new(0.1, 0.1),
            t,
        )
    }

    fn tracker(timeout: f64, interval: f64) -> MarkerTracker {
        MarkerTracker::new(
            TrackerConfig::default()
                .with_tracking_lost_timeout(timeout)
                .with_min_publish_interval(interval),
        )
        .expect("valid config")
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = TrackerConfig::default().with_tracking_lost_timeout(-2.0);
        assert!(MarkerTracker::new(cfg).is_err());
    }

    #[test]
    fn intake_never_publishes() {
        let mut t = tracker(2.0, 2.0);
        assert_eq!(t.report_detection(det("a", 1.0, 0.0)), Some(Upsert::Created));
        assert_eq!(t.report_detection(det("a", 2.0, 0.1)), Some(Upsert::Updated));
        assert_eq!(t.last_publish_time(), None);
        assert_eq!(t.state(), EngineState::Idle);
        assert_eq!(t.peek().len(), 1);
    }

    #[test]
    fn ingest_counts_drops_per_detection() {
        let mut t = tracker(2.0, 2.0);
        let mut missing_pose = det("b", 0.0, 0.0);
        missing_pose.pose = None;
        let stats = t.ingest(vec![det("a", 0.0, 0.0), missing_pose, det("a", 1.0, 0.1)]);

        assert_eq!(
            stats,
            IngestStats {
                created: 1,
                updated: 1,
                dropped: 1
            }
        );
        assert!(t.store().get("b").is_none());
        assert_eq!(t.store().get("a").unwrap().last_seen_time, 0.1);
    }

    #[test]
    fn first_tick_publishes_then_interval_gates() {
        let mut t = tracker(2.0, 2.0);
        t.report_detection(det("a", 0.0, 0.0));

        let first = t.tick(0.0).expect("first tick publishes");
        assert_eq!(first.sequence, 0);
        assert!(t.tick(1.0).is_none());
        assert!(t.tick(2.0).is_none());
        let second = t.tick(2.01).expect("interval elapsed");
        assert_eq!(second.sequence, 1);
    }

    #[test]
    fn shutdown_releases_subscribers() {
        let mut t = tracker(2.0, 0.0);
        let _ = t.subscribe(|_| {});
        let _ = t.subscribe(|_| {});
        assert_eq!(t.subscriber_count(), 2);
        t.shutdown();
        assert_eq!(t.subscriber_count(), 0);
        assert!(t.tick(0.0).is_some());
    }

    #[test]
    fn untracked_marker_is_reported_once_then_removed() {
        let mut t = tracker(1.0, 0.0);
        t.report_detection(det("a", 0.0, 0.0));

        let s = t.tick(1.5).unwrap();
        assert!(!s.get("a").unwrap().is_tracked);
        let s = t.tick(1.6).unwrap();
        assert!(s.get("a").is_none());
        assert!(t.store().get(MarkerId::new("a").as_str()).is_none());
    }
}
