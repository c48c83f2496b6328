//! Adapter for a platform QR-code marker manager.
//!
//! The manager reports markers by an opaque trackable id together with the
//! decoded string, a centered pose and a physical size. Its marker frame has
//! the code lying in the local XY plane; consumers expect it in XZ, so every
//! pose gets a fixed +90° rotation about the local X axis.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use log::{debug, info};
use marker_track_core::{
    BackendError, Capability, Detection, DetectionBatch, MarkerBackend, MarkerId, Pose,
};
use nalgebra::{UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::feed::{RawFeed, RawSender};
use crate::host::MarkerHost;

/// One marker as reported by the QR marker manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QrMarkerEvent {
    pub trackable_id: String,
    #[serde(default)]
    pub decoded: String,
    /// Native pose; `None` while the manager has not localized the code.
    #[serde(default)]
    pub pose: Option<Pose>,
    pub size: Vector2<f32>,
    /// Manager-side timestamp of the last sighting, in host seconds.
    pub last_seen_time: f64,
}

/// Change notification emitted by the marker manager.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QrMarkersChanged {
    #[serde(default)]
    pub added: Vec<QrMarkerEvent>,
    #[serde(default)]
    pub updated: Vec<QrMarkerEvent>,
    /// Ids the manager dropped. Eviction is left to the engine's staleness
    /// sweep so consumers still get the untracked transition.
    #[serde(default)]
    pub removed: Vec<String>,
}

/// Local rotation turning the manager's marker frame into the consumer convention.
pub fn qr_local_offset() -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2)
}

/// QR marker manager backend.
pub struct PlanarQrBackend {
    name: String,
    host: Arc<dyn MarkerHost>,
    feed: RawFeed<QrMarkersChanged>,
    local_offset: UnitQuaternion<f32>,
    enabled: bool,
}

impl PlanarQrBackend {
    pub const NAME: &'static str = "planar-qr";

    pub fn new(host: Arc<dyn MarkerHost>) -> Self {
        Self {
            name: Self::NAME.to_owned(),
            host,
            feed: RawFeed::new(),
            local_offset: qr_local_offset(),
            enabled: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the fixed local rotation applied to every pose.
    pub fn with_local_offset(mut self, offset: UnitQuaternion<f32>) -> Self {
        self.local_offset = offset;
        self
    }

    /// Queue handle for the manager's change callback.
    pub fn sender(&self) -> RawSender<QrMarkersChanged> {
        self.feed.sender()
    }

    fn normalize(&self, event: QrMarkerEvent) -> Option<Detection> {
        if event.trackable_id.is_empty() {
            debug!("{}: dropping marker without trackable id", self.name);
            return None;
        }
        let Some(pose) = event.pose else {
            debug!(
                "{}: dropping marker {} without pose",
                self.name, event.trackable_id
            );
            return None;
        };
        Some(Detection {
            id: MarkerId::new(event.trackable_id),
            payload: event.decoded,
            pose: Some(pose.rotated_local(&self.local_offset)),
            size: event.size,
            timestamp: event.last_seen_time,
        })
    }
}

impl MarkerBackend for PlanarQrBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn enable(&mut self) -> Result<(), BackendError> {
        if !self.host.has_capability(Capability::QrCodeTracking) {
            return Err(BackendError::CapabilityUnavailable {
                backend: self.name.clone(),
                capability: Capability::QrCodeTracking,
            });
        }
        if !self.enabled {
            // Events queued while disabled are stale by now.
            let stale = self.feed.discard();
            if stale > 0 {
                debug!("{}: discarded {stale} queued change events", self.name);
            }
            self.enabled = true;
            info!("{}: listening for marker changes", self.name);
        }
        Ok(())
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self), fields(backend = %self.name))
    )]
    fn poll(&mut self, _now: f64) -> DetectionBatch {
        if !self.enabled {
            self.feed.discard();
            return Vec::new();
        }
        let mut batch = Vec::new();
        for change in self.feed.drain() {
            for event in change.added.into_iter().chain(change.updated) {
                if let Some(detection) = self.normalize(event) {
                    batch.push(detection);
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticHost;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn host() -> Arc<dyn MarkerHost> {
        StaticHost::new()
            .with_capability(Capability::QrCodeTracking)
            .into_shared()
    }

    fn event(id: &str, decoded: &str, pose: Option<Pose>, t: f64) -> QrMarkerEvent {
        QrMarkerEvent {
            trackable_id: id.into(),
            decoded: decoded.into(),
            pose,
            size: Vector2::new(0.12, 0.12),
            last_seen_time: t,
        }
    }

    #[test]
    fn enable_requires_qr_capability() {
        let mut backend = PlanarQrBackend::new(StaticHost::new().into_shared());
        let err = backend.enable().unwrap_err();
        assert_eq!(
            err,
            BackendError::CapabilityUnavailable {
                backend: PlanarQrBackend::NAME.into(),
                capability: Capability::QrCodeTracking,
            }
        );
        assert!(!backend.is_enabled());
    }

    #[test]
    fn normalizes_added_and_updated_markers() {
        let mut backend = PlanarQrBackend::new(host());
        backend.enable().unwrap();
        let tx = backend.sender();

        let position = Vector3::new(0.3, 1.2, -0.5);
        let seen = event("guid-1", "https://example.org", Some(Pose::from_position(position)), 4.0);
        tx.send(QrMarkersChanged {
            added: vec![seen],
            updated: vec![event("guid-2", "", None, 4.0)],
            removed: vec!["guid-0".into()],
        });

        let batch = backend.poll(4.1);
        assert_eq!(batch.len(), 1);
        let det = &batch[0];
        assert_eq!(det.id.as_str(), "guid-1");
        assert_eq!(det.payload, "https://example.org");
        assert_eq!(det.timestamp, 4.0);
        assert_eq!(det.size, Vector2::new(0.12, 0.12));

        let pose = det.pose.unwrap();
        assert_eq!(pose.position, position);
        // Marker normal (local Z) now points along world -Y: code lies flat in XZ.
        let normal = pose.rotation * Vector3::z();
        assert_relative_eq!(normal, -Vector3::y(), epsilon = 1e-6);
    }

    #[test]
    fn disabled_backend_discards_queued_changes() {
        let mut backend = PlanarQrBackend::new(host());
        let tx = backend.sender();
        tx.send(QrMarkersChanged {
            added: vec![event("guid-1", "a", Some(Pose::identity()), 0.0)],
            ..Default::default()
        });

        assert!(backend.poll(0.0).is_empty());
        backend.enable().unwrap();
        assert!(backend.poll(0.1).is_empty());

        backend.disable();
        tx.send(QrMarkersChanged {
            updated: vec![event("guid-1", "a", Some(Pose::identity()), 0.2)],
            ..Default::default()
        });
        assert!(backend.poll(0.3).is_empty());
    }
}
