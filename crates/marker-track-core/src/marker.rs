use std::borrow::Borrow;
use std::fmt;

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Stable identity of a physical marker.
///
/// The encoding is backend-defined: a trackable id, a decoded QR string or a
/// decimal ArUco number all work as long as the backend re-associates the same
/// marker to the same id across frames.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(String);

impl MarkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Borrow<str> for MarkerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MarkerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for MarkerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Rigid pose in the consumer-facing reference frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    pub fn from_position(position: Vector3<f32>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    pub fn from_isometry(iso: &Isometry3<f32>) -> Self {
        Self {
            position: iso.translation.vector,
            rotation: iso.rotation,
        }
    }

    pub fn to_isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position), self.rotation)
    }

    /// Post-multiply a fixed rotation expressed in the marker's local frame.
    ///
    /// Backends whose native marker axes differ from the consumer convention
    /// use this to apply their constant fix-up.
    pub fn rotated_local(&self, offset: &UnitQuaternion<f32>) -> Self {
        Self {
            position: self.position,
            rotation: self.rotation * offset,
        }
    }

    /// Express this pose, given relative to `origin`, in the parent frame of `origin`.
    pub fn transformed_by(&self, origin: &Isometry3<f32>) -> Self {
        Self {
            position: origin.transform_point(&Point3::from(self.position)).coords,
            rotation: origin.rotation * self.rotation,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.rotation.coords.iter().all(|v| v.is_finite())
    }

    /// Deserialized rotations are not renormalized; this checks the stored
    /// quaternion really has unit length.
    pub fn has_unit_rotation(&self) -> bool {
        (self.rotation.coords.norm() - 1.0).abs() <= UNIT_NORM_TOLERANCE
    }
}

const UNIT_NORM_TOLERANCE: f32 = 1e-3;

/// One normalized detection handed from a backend adapter to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: MarkerId,
    /// Decoded marker content. May be empty.
    #[serde(default)]
    pub payload: String,
    /// `None` marks a detection the backend could not localize; it is dropped.
    #[serde(default)]
    pub pose: Option<Pose>,
    #[serde(default = "zero_size")]
    pub size: Vector2<f32>,
    /// Monotonic seconds.
    pub timestamp: f64,
}

impl Detection {
    pub fn new(
        id: impl Into<MarkerId>,
        payload: impl Into<String>,
        pose: Pose,
        size: Vector2<f32>,
        timestamp: f64,
    ) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            pose: Some(pose),
            size,
            timestamp,
        }
    }

    /// Returns the pose if every field is usable by the store.
    ///
    /// An empty id, a missing pose, a non-unit rotation, or any non-finite value
    /// makes the detection malformed.
    pub fn validated_pose(&self) -> Option<Pose> {
        if self.id.is_empty() || !self.timestamp.is_finite() {
            return None;
        }
        if !self.size.iter().all(|v| v.is_finite()) {
            return None;
        }
        self.pose
            .filter(|p| p.is_finite() && p.has_unit_rotation())
    }
}

fn zero_size() -> Vector2<f32> {
    Vector2::zeros()
}

/// Detections produced by one adapter poll, in arrival order.
pub type DetectionBatch = Vec<Detection>;

/// Current knowledge about one marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedMarker {
    pub id: MarkerId,
    pub payload: String,
    pub pose: Pose,
    /// Physical extent (width, height). `(0, 0)` when the backend cannot estimate it.
    pub size: Vector2<f32>,
    pub last_seen_time: f64,
    pub is_tracked: bool,
}

impl TrackedMarker {
    /// Seconds since the last detection, as seen at `now`.
    #[inline]
    pub fn age(&self, now: f64) -> f64 {
        now - self.last_seen_time
    }
}
