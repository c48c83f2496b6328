//! Adapter for a multi-detector marker understanding runtime.
//!
//! The runtime runs one detector per marker type (QR, ArUco). Each detector
//! reports readings with a pose relative to the tracking origin and an
//! estimated side length. Identity depends on the marker type:
//!
//! | type  | id                         | payload |
//! |-------|----------------------------|---------|
//! | QR    | decoded string             | id      |
//! | ArUco | decimal marker number      | id      |
//!
//! Poses are moved into the world frame through the host origin transform and
//! then rotated −90° about the local X axis. Readings carry no timestamp of
//! their own; the poll time is used.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use log::{debug, info, warn};
use marker_track_core::{
    BackendError, Capability, Detection, DetectionBatch, MarkerBackend, MarkerId, Pose,
};
use nalgebra::{Isometry3, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::feed::{RawFeed, RawSender};
use crate::host::{DetectorHandle, MarkerHost};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerType {
    Qr,
    Aruco,
}

/// ArUco dictionaries the runtime can decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArucoDictionary {
    #[serde(rename = "DICT_4X4_50")]
    Dict4x4_50,
    #[serde(rename = "DICT_4X4_100")]
    Dict4x4_100,
    #[serde(rename = "DICT_4X4_250")]
    Dict4x4_250,
    #[default]
    #[serde(rename = "DICT_5X5_50")]
    Dict5x5_50,
    #[serde(rename = "DICT_5X5_100")]
    Dict5x5_100,
    #[serde(rename = "DICT_6X6_50")]
    Dict6x6_50,
    #[serde(rename = "DICT_6X6_250")]
    Dict6x6_250,
    #[serde(rename = "DICT_7X7_50")]
    Dict7x7_50,
}

/// Runtime tuning preset for the detectors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorProfile {
    #[default]
    Default,
    Speed,
    Accuracy,
    SmallTargets,
    Large,
}

/// Backend-specific detector settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiDetectorSettings {
    pub enable_qr: bool,
    pub enable_aruco: bool,
    pub aruco_dictionary: ArucoDictionary,
    /// Let the runtime estimate the physical side length of each marker.
    pub estimate_length: bool,
    pub profile: DetectorProfile,
}

impl Default for MultiDetectorSettings {
    fn default() -> Self {
        Self {
            enable_qr: true,
            enable_aruco: false,
            aruco_dictionary: ArucoDictionary::default(),
            estimate_length: true,
            profile: DetectorProfile::default(),
        }
    }
}

impl MultiDetectorSettings {
    /// One detector config per enabled marker type.
    pub fn detector_configs(&self) -> Vec<DetectorConfig> {
        let mut configs = Vec::with_capacity(2);
        if self.enable_qr {
            configs.push(DetectorConfig {
                marker_type: MarkerType::Qr,
                profile: self.profile,
                estimate_length: self.estimate_length,
                aruco_dictionary: None,
            });
        }
        if self.enable_aruco {
            configs.push(DetectorConfig {
                marker_type: MarkerType::Aruco,
                profile: self.profile,
                estimate_length: self.estimate_length,
                aruco_dictionary: Some(self.aruco_dictionary),
            });
        }
        configs
    }
}

/// What the host is asked to create for one marker type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub marker_type: MarkerType,
    pub profile: DetectorProfile,
    pub estimate_length: bool,
    pub aruco_dictionary: Option<ArucoDictionary>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorStatus {
    #[default]
    Pending,
    Ready,
    Error,
}

/// One marker reading from a detector.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerReading {
    /// ArUco marker number.
    #[serde(default)]
    pub number: Option<u64>,
    /// Decoded QR content.
    #[serde(default)]
    pub text: Option<String>,
    /// Pose relative to the tracking origin.
    #[serde(default)]
    pub pose: Option<Pose>,
    /// Estimated side length in meters.
    #[serde(default)]
    pub length: f32,
}

/// Everything one detector reported during one runtime update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorFrame {
    pub marker_type: MarkerType,
    pub status: DetectorStatus,
    #[serde(default)]
    pub readings: Vec<MarkerReading>,
}

/// Local rotation turning the runtime's marker frame into the consumer convention.
pub fn multi_local_offset() -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -FRAC_PI_2)
}

/// Stable id for a reading, or `None` if the type-specific field is missing.
pub fn reading_id(marker_type: MarkerType, reading: &MarkerReading) -> Option<MarkerId> {
    match marker_type {
        MarkerType::Aruco => reading.number.map(|n| MarkerId::new(n.to_string())),
        MarkerType::Qr => reading
            .text
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(MarkerId::from),
    }
}

/// QR + ArUco marker understanding backend.
pub struct MultiDetectorBackend {
    name: String,
    host: Arc<dyn MarkerHost>,
    settings: MultiDetectorSettings,
    feed: RawFeed<DetectorFrame>,
    detectors: Vec<DetectorConfig>,
    handles: Vec<DetectorHandle>,
    local_offset: UnitQuaternion<f32>,
    initialized: bool,
    enabled: bool,
}

impl MultiDetectorBackend {
    pub const NAME: &'static str = "multi-detector";

    pub fn new(host: Arc<dyn MarkerHost>, settings: MultiDetectorSettings) -> Self {
        Self {
            name: Self::NAME.to_owned(),
            host,
            settings,
            feed: RawFeed::new(),
            detectors: Vec::new(),
            handles: Vec::new(),
            local_offset: multi_local_offset(),
            initialized: false,
            enabled: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[inline]
    pub fn settings(&self) -> &MultiDetectorSettings {
        &self.settings
    }

    /// Detectors created on the host by the last successful `enable`.
    #[inline]
    pub fn detectors(&self) -> &[DetectorConfig] {
        &self.detectors
    }

    /// Queue handle for the runtime's per-update detector output.
    pub fn sender(&self) -> RawSender<DetectorFrame> {
        self.feed.sender()
    }

    fn initialize(&mut self) -> Result<(), BackendError> {
        if self.host.origin_transform().is_none() {
            return Err(BackendError::MissingOrigin {
                backend: self.name.clone(),
            });
        }
        if !self.host.has_capability(Capability::MarkerUnderstanding) {
            return Err(BackendError::CapabilityUnavailable {
                backend: self.name.clone(),
                capability: Capability::MarkerUnderstanding,
            });
        }

        let configs = self.settings.detector_configs();
        if configs.is_empty() {
            return Err(BackendError::NoDetectors {
                backend: self.name.clone(),
            });
        }
        let mut handles = Vec::with_capacity(configs.len());
        for config in &configs {
            match self.host.create_detector(config) {
                Ok(handle) => {
                    info!("{}: created {:?} detector", self.name, config.marker_type);
                    handles.push(handle);
                }
                Err(reason) => {
                    for handle in handles {
                        self.host.destroy_detector(handle);
                    }
                    return Err(BackendError::DetectorCreation {
                        backend: self.name.clone(),
                        reason,
                    });
                }
            }
        }
        self.detectors = configs;
        self.handles = handles;
        self.initialized = true;
        Ok(())
    }

    fn has_detector(&self, marker_type: MarkerType) -> bool {
        self.detectors.iter().any(|d| d.marker_type == marker_type)
    }

    fn normalize(
        &self,
        marker_type: MarkerType,
        reading: MarkerReading,
        origin: &Isometry3<f32>,
        now: f64,
    ) -> Option<Detection> {
        let Some(id) = reading_id(marker_type, &reading) else {
            debug!("{}: dropping {marker_type:?} reading without id", self.name);
            return None;
        };
        let Some(pose) = reading.pose else {
            debug!("{}: dropping marker {id} without pose", self.name);
            return None;
        };
        let pose = pose.transformed_by(origin).rotated_local(&self.local_offset);
        Some(Detection {
            payload: id.as_str().to_owned(),
            id,
            pose: Some(pose),
            size: Vector2::new(reading.length, reading.length),
            timestamp: now,
        })
    }
}

impl MarkerBackend for MultiDetectorBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn enable(&mut self) -> Result<(), BackendError> {
        if !self.initialized {
            self.initialize()?;
        }
        if !self.enabled {
            self.feed.discard();
            self.enabled = true;
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
    fn poll(&mut self, now: f64) -> DetectionBatch {
        let frames = self.feed.drain();
        if !self.enabled || frames.is_empty() {
            return Vec::new();
        }
        let Some(origin) = self.host.origin_transform() else {
            warn!(
                "{}: tracking origin lost, dropping {} detector frames",
                self.name,
                frames.len()
            );
            return Vec::new();
        };

        let mut batch = Vec::new();
        for frame in frames {
            if frame.status != DetectorStatus::Ready || !self.has_detector(frame.marker_type) {
                continue;
            }
            for reading in frame.readings {
                if let Some(detection) = self.normalize(frame.marker_type, reading, &origin, now) {
                    batch.push(detection);
                }
            }
        }
        batch
    }
}

impl Drop for MultiDetectorBackend {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            self.host.destroy_detector(handle);
        }
    }
}
