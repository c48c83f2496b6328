//! The host platform seen from a backend adapter.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use marker_track_core::Capability;
use nalgebra::Isometry3;

use crate::multi::DetectorConfig;

/// Host-side identity of one created detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DetectorHandle(u64);

impl DetectorHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Services an adapter needs from the XR runtime it is embedded in.
///
/// Adapters receive the host explicitly at construction; nothing is looked
/// up globally.
pub trait MarkerHost: Send + Sync {
    fn has_capability(&self, capability: Capability) -> bool;

    /// Transform from the tracking origin (e.g. the camera floor offset) to the
    /// consumer-facing world frame. `None` when the host has no origin.
    fn origin_transform(&self) -> Option<Isometry3<f32>>;

    /// Ask the runtime to start a marker detector.
    fn create_detector(&self, config: &DetectorConfig) -> Result<DetectorHandle, String> {
        Err(format!(
            "host cannot create {:?} detectors",
            config.marker_type
        ))
    }

    /// Tear down one detector. Other detectors on the host, including those
    /// of other backends, stay alive.
    fn destroy_detector(&self, _handle: DetectorHandle) {}
}

/// Fixed-answer host, useful for simulation, replay and tests.
///
/// Records the detectors it was asked to create.
#[derive(Debug, Default)]
pub struct StaticHost {
    capabilities: HashSet<Capability>,
    origin: Option<Isometry3<f32>>,
    detector_limit: Option<usize>,
    next_handle: AtomicU64,
    detectors: Mutex<Vec<(DetectorHandle, DetectorConfig)>>,
}

impl StaticHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn with_origin(mut self, origin: Isometry3<f32>) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Refuse to create detectors once `limit` are alive.
    pub fn with_detector_limit(mut self, limit: usize) -> Self {
        self.detector_limit = Some(limit);
        self
    }

    pub fn into_shared(self) -> Arc<dyn MarkerHost> {
        Arc::new(self)
    }

    /// Detectors currently alive on this host.
    pub fn detectors(&self) -> Vec<DetectorConfig> {
        self.detectors
            .lock()
            .map(|d| d.iter().map(|(_, config)| *config).collect())
            .unwrap_or_default()
    }
}

impl MarkerHost for StaticHost {
    fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    fn origin_transform(&self) -> Option<Isometry3<f32>> {
        self.origin
    }

    fn create_detector(&self, config: &DetectorConfig) -> Result<DetectorHandle, String> {
        let mut detectors = self
            .detectors
            .lock()
            .map_err(|_| "detector registry poisoned".to_string())?;
        if self.detector_limit.is_some_and(|limit| detectors.len() >= limit) {
            return Err(format!("detector limit of {} reached", detectors.len()));
        }
        let handle = DetectorHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        detectors.push((handle, *config));
        Ok(handle)
    }

    fn destroy_detector(&self, handle: DetectorHandle) {
        if let Ok(mut detectors) = self.detectors.lock() {
            detectors.retain(|(h, _)| *h != handle);
        }
    }
}
