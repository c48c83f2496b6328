//! Capability interface implemented by every tracking backend adapter.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DetectionBatch;

/// Host platform features a backend may depend on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Platform QR-code marker manager.
    QrCodeTracking,
    /// Multi-detector marker understanding (QR, ArUco, ...).
    MarkerUnderstanding,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::QrCodeTracking => "qr-code tracking",
            Capability::MarkerUnderstanding => "marker understanding",
        };
        f.write_str(name)
    }
}

/// Fatal backend start-up failures. A backend that fails to enable delivers
/// nothing until a later `enable` succeeds.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("{backend}: required host capability `{capability}` is missing or disabled")]
    CapabilityUnavailable {
        backend: String,
        capability: Capability,
    },
    #[error("{backend}: no tracking origin found, markers cannot be placed")]
    MissingOrigin { backend: String },
    #[error("{backend}: no marker detector type is enabled")]
    NoDetectors { backend: String },
    #[error("{backend}: failed to create marker detector: {reason}")]
    DetectorCreation { backend: String, reason: String },
}

/// A technology-specific producer of normalized detections.
///
/// Implementations receive raw, backend-native events on their own cadence
/// and turn them into [`Detection`](crate::Detection)s whose pose is already in
/// the shared reference frame. They never touch the engine's store directly;
/// the driver hands each polled batch to the engine's intake.
pub trait MarkerBackend: Send {
    fn name(&self) -> &str;

    /// Acquire host resources. Missing host capabilities are reported as errors.
    fn enable(&mut self) -> Result<(), BackendError>;

    fn disable(&mut self);

    fn is_enabled(&self) -> bool;

    /// Drain pending raw events into one normalized batch.
    ///
    /// A disabled backend returns an empty batch and discards whatever raw
    /// events arrived in the meantime.
    fn poll(&mut self, now: f64) -> DetectionBatch;
}

impl<B: MarkerBackend + ?Sized> MarkerBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn enable(&mut self) -> Result<(), BackendError> {
        (**self).enable()
    }

    fn disable(&mut self) {
        (**self).disable()
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }

    fn poll(&mut self, now: f64) -> DetectionBatch {
        (**self).poll(now)
    }
}
