//! Replaying recorded detection sessions through the full tracking service.

use std::collections::VecDeque;

use log::debug;
use marker_track_core::{
    BackendError, Detection, DetectionBatch, MarkerBackend, MarkerSnapshot, TrackingService,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::io::{SessionConfig, SessionError};
use crate::mirror::{MarkerMirror, MirrorEvent};

/// Detections captured during one host frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    /// Host time at which the frame was delivered, in seconds.
    pub time: f64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// Backend that plays back recorded frames as time advances.
#[derive(Debug)]
pub struct ReplayBackend {
    frames: VecDeque<RecordedFrame>,
    enabled: bool,
}

impl ReplayBackend {
    pub const NAME: &'static str = "replay";

    /// Frames are played in time order regardless of input order.
    pub fn new(mut frames: Vec<RecordedFrame>) -> Self {
        frames.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            frames: frames.into(),
            enabled: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    fn take_due(&mut self, now: f64) -> Vec<RecordedFrame> {
        let mut due = Vec::new();
        while self.frames.front().is_some_and(|f| f.time <= now) {
            if let Some(frame) = self.frames.pop_front() {
                due.push(frame);
            }
        }
        due
    }
}

impl MarkerBackend for ReplayBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn enable(&mut self) -> Result<(), BackendError> {
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn poll(&mut self, now: f64) -> DetectionBatch {
        let due = self.take_due(now);
        if !self.enabled {
            if !due.is_empty() {
                debug!("replay: skipping {} frames while disabled", due.len());
            }
            return Vec::new();
        }
        due.into_iter().flat_map(|f| f.detections).collect()
    }
}

/// Upper bound on simulated host updates in one replay run.
pub const MAX_REPLAY_UPDATES: u64 = 10_000_000;

/// Host loop cadence for a replay run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReplayOptions {
    /// Seconds between two host updates.
    pub step: f64,
    /// Last host time to simulate. Defaults to long enough after the last
    /// frame for every marker to be reported lost and removed.
    pub until: Option<f64>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            step: 1.0 / 60.0,
            until: None,
        }
    }
}

/// One published snapshot plus the mirror events it caused.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportLine {
    #[serde(flatten)]
    pub snapshot: MarkerSnapshot,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<MirrorEvent>,
}

/// Drive a full tracking service over a recorded session.
///
/// Returns every published snapshot in order. When the session defines
/// templates, each line also carries the mirror events for that snapshot.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(session), fields(frames = session.frames.len()))
)]
pub fn run_session(
    session: &SessionConfig,
    options: ReplayOptions,
) -> Result<Vec<ReportLine>, SessionError> {
    if !options.step.is_finite() || options.step <= 0.0 {
        return Err(SessionError::InvalidStep(options.step));
    }
    session.validate()?;

    let backend = ReplayBackend::new(session.frames.clone());
    let start = session.frames.iter().map(|f| f.time).fold(f64::INFINITY, f64::min);
    let start = if start.is_finite() { start } else { 0.0 };
    let last = session
        .frames
        .iter()
        .map(|f| f.time)
        .fold(start, f64::max);
    let tracker = &session.tracker;
    let end = options.until.unwrap_or(
        last + tracker.tracking_lost_timeout + 2.0 * (tracker.min_publish_interval + options.step),
    );

    let updates = ((end - start) / options.step).floor() + 1.0;
    if !updates.is_finite() || updates > MAX_REPLAY_UPDATES as f64 {
        return Err(SessionError::TooManyUpdates {
            span: end - start,
            step: options.step,
            limit: MAX_REPLAY_UPDATES,
        });
    }

    let mut service = TrackingService::new(*tracker)?.with_backend(backend);
    service.enable_all()?;
    let mut mirror = session.templates.clone().map(MarkerMirror::new);

    let mut lines = Vec::new();
    for frame in 0..updates.max(0.0) as u64 {
        let now = start + frame as f64 * options.step;
        if now > end {
            break;
        }
        if let Some(snapshot) = service.update(now) {
            let events = mirror
                .as_mut()
                .map(|m| m.apply(&snapshot))
                .unwrap_or_default();
            lines.push(ReportLine { snapshot, events });
        }
    }
    service.shutdown();
    Ok(lines)
}
