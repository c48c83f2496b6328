//! Tracking backend adapters for `marker-track-core`.
//!
//! Each adapter turns one runtime's native marker events into normalized
//! [`Detection`](marker_track_core::Detection)s in the shared world frame:
//! - [`PlanarQrBackend`]: QR marker manager keyed by trackable id, one fixed
//!   local rotation fix-up.
//! - [`MultiDetectorBackend`]: QR and ArUco detectors with per-type identity
//!   and an origin-relative pose transform.
//!
//! Raw events are pushed through a [`RawSender`] from whatever thread the
//! runtime calls back on, and drained when the engine polls the adapter.

mod feed;
mod host;
mod multi;
mod planar;

pub use feed::{RawFeed, RawSender};
pub use host::{DetectorHandle, MarkerHost, StaticHost};
pub use multi::{
    multi_local_offset, reading_id, ArucoDictionary, DetectorConfig, DetectorFrame,
    DetectorProfile, DetectorStatus, MarkerReading, MarkerType, MultiDetectorBackend,
    MultiDetectorSettings,
};
pub use planar::{qr_local_offset, PlanarQrBackend, QrMarkerEvent, QrMarkersChanged};
