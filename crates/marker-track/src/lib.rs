//! High-level facade for the `marker-track-*` crates.
//!
//! - [`core`]: marker records, reconciliation engine, snapshots, service.
//! - [`adapters`]: planar QR and multi-detector backends.
//! - [`replay`]: play recorded sessions through the full service.
//! - [`mirror`]: turn snapshots into spawn/move/release events for a scene.
//! - [`logging`]: stderr or `tracing` output scoped to the tracking crates.
//!
//! ## Quickstart
//!
//! ```
//! use marker_track::replay::{run_session, RecordedFrame, ReplayOptions};
//! use marker_track::io::SessionConfig;
//! use marker_track::{Detection, Pose, TrackerConfig};
//! use nalgebra::{Vector2, Vector3};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pose = Pose::from_position(Vector3::new(0.0, 0.0, 1.0));
//! let session = SessionConfig {
//!     tracker: TrackerConfig::default().with_min_publish_interval(0.5),
//!     frames: vec![RecordedFrame {
//!         time: 0.0,
//!         detections: vec![Detection::new("7", "door", pose, Vector2::new(0.1, 0.1), 0.0)],
//!     }],
//!     templates: None,
//! };
//! let report = run_session(&session, ReplayOptions::default())?;
//! assert!(report[0].snapshot.get("7").is_some_and(|m| m.is_tracked));
//! # Ok(())
//! # }
//! ```

pub use marker_track_adapters as adapters;
pub use marker_track_core as core;

pub use marker_track_core::{
    Detection, MarkerBackend, MarkerId, MarkerSnapshot, MarkerTracker, Pose, TrackedMarker,
    TrackerConfig, TrackingService,
};

pub mod io;
pub mod logging;
pub mod mirror;
pub mod replay;
