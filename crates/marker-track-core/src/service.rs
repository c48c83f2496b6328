//! Composition root tying backends to one engine.

use log::{info, warn};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    BackendError, ConfigError, MarkerBackend, MarkerSnapshot, MarkerTracker, SubscriptionHandle,
    TrackerConfig,
};

/// Position of a backend inside a [`TrackingService`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BackendIndex(usize);

impl BackendIndex {
    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

/// One engine plus the backends feeding it.
///
/// Consumers receive the service (or its tracker) explicitly; there is no
/// global registry to look it up from.
pub struct TrackingService {
    tracker: MarkerTracker,
    backends: Vec<Box<dyn MarkerBackend>>,
}

impl TrackingService {
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_tracker(MarkerTracker::new(config)?))
    }

    pub fn from_tracker(tracker: MarkerTracker) -> Self {
        Self {
            tracker,
            backends: Vec::new(),
        }
    }

    pub fn with_backend(mut self, backend: impl MarkerBackend + 'static) -> Self {
        let _ = self.add_backend(backend);
        self
    }

    pub fn add_backend(&mut self, backend: impl MarkerBackend + 'static) -> BackendIndex {
        self.backends.push(Box::new(backend));
        BackendIndex(self.backends.len() - 1)
    }

    pub fn backend(&self, index: BackendIndex) -> Option<&dyn MarkerBackend> {
        self.backends.get(index.0).map(|b| &**b)
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Enable one backend. Start-up failures are returned, never swallowed.
    ///
    /// # Panics
    ///
    /// Panics if `index` did not come from this service.
    pub fn enable(&mut self, index: BackendIndex) -> Result<(), BackendError> {
        let backend = &mut self.backends[index.0];
        backend.enable()?;
        info!("backend '{}' enabled", backend.name());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if `index` did not come from this service.
    pub fn disable(&mut self, index: BackendIndex) {
        let backend = &mut self.backends[index.0];
        backend.disable();
        info!("backend '{}' disabled", backend.name());
    }

    /// Enable every backend, stopping at the first failure.
    pub fn enable_all(&mut self) -> Result<(), BackendError> {
        for i in 0..self.backends.len() {
            self.enable(BackendIndex(i))?;
        }
        Ok(())
    }

    /// One host frame: drain every backend into the engine, then tick.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn update(&mut self, now: f64) -> Option<MarkerSnapshot> {
        for backend in &mut self.backends {
            // Disabled backends are polled too so they can discard queued raw events.
            let batch = backend.poll(now);
            if batch.is_empty() {
                continue;
            }
            let stats = self.tracker.ingest(batch);
            if stats.dropped > 0 {
                warn!(
                    "backend '{}' delivered {} malformed detections",
                    backend.name(),
                    stats.dropped
                );
            }
        }
        self.tracker.tick(now)
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionHandle
    where
        F: FnMut(&MarkerSnapshot) + Send + 'static,
    {
        self.tracker.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        self.tracker.unsubscribe(handle)
    }

    #[inline]
    pub fn tracker(&self) -> &MarkerTracker {
        &self.tracker
    }

    #[inline]
    pub fn tracker_mut(&mut self) -> &mut MarkerTracker {
        &mut self.tracker
    }

    /// Disable every backend and release every subscriber.
    pub fn shutdown(&mut self) {
        for backend in &mut self.backends {
            if backend.is_enabled() {
                backend.disable();
            }
        }
        self.tracker.shutdown();
        info!("tracking service shut down");
    }
}

impl std::fmt::Debug for TrackingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.backends.iter().map(|b| b.name()).collect();
        f.debug_struct("TrackingService")
            .field("tracker", &self.tracker)
            .field("backends", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Detection, DetectionBatch, Pose};
    use nalgebra::{Vector2, Vector3};
    use std::collections::VecDeque;

    /// Backend that replays canned batches, one per poll.
    struct Scripted {
        enabled: bool,
        fail: bool,
        batches: VecDeque<DetectionBatch>,
    }

    impl Scripted {
        fn new(batches: Vec<DetectionBatch>) -> Self {
            Self {
                enabled: false,
                fail: false,
                batches: batches.into(),
            }
        }
    }

    impl MarkerBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn enable(&mut self) -> Result<(), BackendError> {
            if self.fail {
                return Err(BackendError::MissingOrigin {
                    backend: "scripted".into(),
                });
            }
            self.enabled = true;
            Ok(())
        }

        fn disable(&mut self) {
            self.enabled = false;
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn poll(&mut self, _now: f64) -> DetectionBatch {
            let batch = self.batches.pop_front().unwrap_or_default();
            if self.enabled {
                batch
            } else {
                Vec::new()
            }
        }
    }

    fn det(id: &str, x: f32, t: f64) -> Detection {
        Detection::new(
            id,
            "",
            Pose::from_position(Vector3::new(x, 0.0, 0.0)),
            Vector2::zeros(),
            t,
        )
    }

    #[test]
    fn update_feeds_enabled_backends_and_publishes() {
        let mut service = TrackingService::new(TrackerConfig::default())
            .unwrap()
            .with_backend(Scripted::new(vec![vec![det("a", 1.0, 0.0)]]));
        service.enable_all().unwrap();

        let snapshot = service.update(0.0).expect("first update publishes");
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("a").unwrap().is_tracked);
    }

    #[test]
    fn disabled_backend_delivers_nothing() {
        let mut service = TrackingService::new(TrackerConfig::default()).unwrap();
        let idx = service.add_backend(Scripted::new(vec![vec![det("a", 1.0, 0.0)]]));

        let snapshot = service.update(0.0).unwrap();
        assert!(snapshot.is_empty());
        assert!(!service.backend(idx).unwrap().is_enabled());
    }

    #[test]
    fn enable_failure_is_surfaced() {
        let mut failing = Scripted::new(Vec::new());
        failing.fail = true;
        let mut service = TrackingService::new(TrackerConfig::default())
            .unwrap()
            .with_backend(failing);

        let err = service.enable_all().unwrap_err();
        assert!(matches!(err, BackendError::MissingOrigin { .. }));
        assert!(!service.backend(BackendIndex(0)).unwrap().is_enabled());
    }

    #[test]
    fn shutdown_disables_backends_and_drops_subscribers() {
        let mut service = TrackingService::new(TrackerConfig::default())
            .unwrap()
            .with_backend(Scripted::new(Vec::new()));
        service.enable_all().unwrap();
        let _ = service.subscribe(|_| {});

        service.shutdown();
        assert!(!service.backend(BackendIndex(0)).unwrap().is_enabled());
        assert_eq!(service.tracker().subscriber_count(), 0);
    }
}
