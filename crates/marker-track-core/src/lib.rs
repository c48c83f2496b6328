//! Core of the marker tracking aggregation layer.
//!
//! Backends report per-marker detections; the engine keeps one record per
//! marker id, ages out markers that stopped being seen, and publishes
//! coalesced snapshots to subscribers.
//!
//! ## Quickstart
//!
//! ```
//! use marker_track_core::{Detection, MarkerTracker, Pose, TrackerConfig};
//! use nalgebra::{Vector2, Vector3};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut tracker = MarkerTracker::new(TrackerConfig::default())?;
//! let _handle = tracker.subscribe(|snapshot| {
//!     for marker in snapshot.tracked() {
//!         println!("{} at {:?}", marker.id, marker.pose.position);
//!     }
//! });
//!
//! let pose = Pose::from_position(Vector3::new(0.0, 1.0, 2.0));
//! tracker.report_detection(Detection::new("qr-1", "hello", pose, Vector2::new(0.1, 0.1), 0.0));
//! let snapshot = tracker.tick(0.0).expect("first tick publishes");
//! assert_eq!(snapshot.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! Concrete backends live in `marker-track-adapters`; this crate only defines
//! the [`MarkerBackend`] capability they implement.

mod backend;
mod channel;
mod config;
mod engine;
mod marker;
mod service;
mod store;

pub use backend::{BackendError, Capability, MarkerBackend};
pub use channel::{ChangeChannel, MarkerSnapshot, SnapshotCallback, SubscriptionHandle};
pub use config::{ConfigError, ConfigIoError, TrackerConfig};
pub use engine::{EngineState, IngestStats, MarkerTracker};
pub use marker::{Detection, DetectionBatch, MarkerId, Pose, TrackedMarker};
pub use service::{BackendIndex, TrackingService};
pub use store::{MarkerStore, Upsert};
