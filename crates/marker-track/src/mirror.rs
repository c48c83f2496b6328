//! Turning snapshots into spawn/move/release events for a scene consumer.
//!
//! A [`MarkerMirror`] keeps one live instance per tracked marker id whose
//! payload maps to a template. It is the headless half of a visualizer: the
//! consumer applies the emitted [`MirrorEvent`]s to its own scene graph.

use std::collections::BTreeMap;

use log::trace;
use marker_track_core::{MarkerId, MarkerSnapshot, Pose, TrackedMarker};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Maps one exact payload to a template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRule {
    pub payload: String,
    pub template: String,
    /// Scale the instance by the marker's physical size.
    #[serde(default)]
    pub scale: bool,
}

/// Template used for payloads without a matching rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackRule {
    pub template: String,
    #[serde(default = "default_true")]
    pub scale: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSet {
    /// First matching rule wins.
    #[serde(default)]
    pub rules: Vec<TemplateRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackRule>,
}

impl TemplateSet {
    /// One template for every marker, always scaled.
    pub fn single(template: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            fallback: Some(FallbackRule {
                template: template.into(),
                scale: true,
            }),
        }
    }

    pub fn with_rule(mut self, payload: impl Into<String>, template: impl Into<String>, scale: bool) -> Self {
        self.rules.push(TemplateRule {
            payload: payload.into(),
            template: template.into(),
            scale,
        });
        self
    }

    /// Template name and scale flag for a payload.
    pub fn resolve(&self, payload: &str) -> Option<(&str, bool)> {
        self.rules
            .iter()
            .find(|r| r.payload == payload)
            .map(|r| (r.template.as_str(), r.scale))
            .or_else(|| {
                self.fallback
                    .as_ref()
                    .map(|f| (f.template.as_str(), f.scale))
            })
    }
}

/// Uniform scale matching a marker of physical size `w x h`.
#[inline]
pub fn scale_factor(size: &Vector2<f32>) -> f32 {
    (size.x * size.y).sqrt()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MirrorEvent {
    Spawn {
        id: MarkerId,
        template: String,
        /// Label text for the new instance.
        payload: String,
        pose: Pose,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<f32>,
    },
    Move {
        id: MarkerId,
        pose: Pose,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<f32>,
    },
    Release {
        id: MarkerId,
    },
}

impl MirrorEvent {
    pub fn id(&self) -> &MarkerId {
        match self {
            Self::Spawn { id, .. } | Self::Move { id, .. } | Self::Release { id } => id,
        }
    }
}

#[derive(Clone, Debug)]
struct Instance {
    template: String,
}

/// Snapshot consumer that tracks which markers have a live instance.
#[derive(Clone, Debug, Default)]
pub struct MarkerMirror {
    templates: TemplateSet,
    live: BTreeMap<MarkerId, Instance>,
}

impl MarkerMirror {
    pub fn new(templates: TemplateSet) -> Self {
        Self {
            templates,
            live: BTreeMap::new(),
        }
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.live.contains_key(id)
    }

    /// Template backing the live instance of `id`, if any.
    pub fn template_of(&self, id: &str) -> Option<&str> {
        self.live.get(id).map(|i| i.template.as_str())
    }

    /// Reconcile live instances with one snapshot.
    ///
    /// Tracked markers with a template spawn once and move afterwards. Live
    /// instances whose marker is untracked or missing from the snapshot are
    /// released. Markers without a template are ignored.
    pub fn apply(&mut self, snapshot: &MarkerSnapshot) -> Vec<MirrorEvent> {
        let mut events = Vec::new();

        for marker in snapshot.tracked() {
            if let Some(event) = self.place(marker) {
                events.push(event);
            }
        }

        let stale: Vec<MarkerId> = self
            .live
            .keys()
            .filter(|id| snapshot.get(id.as_str()).is_none_or(|m| !m.is_tracked))
            .cloned()
            .collect();
        for id in stale {
            self.live.remove(&id);
            events.push(MirrorEvent::Release { id });
        }

        trace!(
            "mirror: {} events for snapshot #{}, {} live",
            events.len(),
            snapshot.sequence,
            self.live.len()
        );
        events
    }

    /// Release every live instance.
    pub fn clear(&mut self) -> Vec<MirrorEvent> {
        std::mem::take(&mut self.live)
            .into_keys()
            .map(|id| MirrorEvent::Release { id })
            .collect()
    }

    fn place(&mut self, marker: &TrackedMarker) -> Option<MirrorEvent> {
        let (template, scaled) = self.templates.resolve(&marker.payload)?;
        let scale = scaled.then(|| scale_factor(&marker.size));

        if self.live.contains_key(&marker.id) {
            return Some(MirrorEvent::Move {
                id: marker.id.clone(),
                pose: marker.pose,
                scale,
            });
        }

        let template = template.to_owned();
        self.live.insert(
            marker.id.clone(),
            Instance {
                template: template.clone(),
            },
        );
        Some(MirrorEvent::Spawn {
            id: marker.id.clone(),
            template,
            payload: marker.payload.clone(),
            pose: marker.pose,
            scale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn marker(id: &str, payload: &str, tracked: bool) -> TrackedMarker {
        TrackedMarker {
            id: id.into(),
            payload: payload.into(),
            pose: Pose::from_position(Vector3::new(1.0, 0.0, 0.0)),
            size: Vector2::new(0.04, 0.09),
            last_seen_time: 0.0,
            is_tracked: tracked,
        }
    }

    fn snap(seq: u64, markers: Vec<TrackedMarker>) -> MarkerSnapshot {
        MarkerSnapshot::new(seq, seq as f64, markers)
    }

    #[test]
    fn spawn_then_move_then_release() {
        let mut mirror = MarkerMirror::new(TemplateSet::single("pin"));

        let events = mirror.apply(&snap(1, vec![marker("a", "hello", true)]));
        assert_eq!(events.len(), 1);
        match &events[0] {
            MirrorEvent::Spawn {
                template,
                payload,
                scale,
                ..
            } => {
                assert_eq!(template, "pin");
                assert_eq!(payload, "hello");
                assert_relative_eq!(scale.unwrap(), 0.06, epsilon = 1e-6);
            }
            other => panic!("expected spawn, got {other:?}"),
        }

        let events = mirror.apply(&snap(2, vec![marker("a", "hello", true)]));
        assert!(matches!(events[0], MirrorEvent::Move { .. }));

        let events = mirror.apply(&snap(3, vec![marker("a", "hello", false)]));
        assert_eq!(events, vec![MirrorEvent::Release { id: "a".into() }]);
        assert_eq!(mirror.live_count(), 0);
    }

    #[test]
    fn rules_pick_template_by_payload() {
        let templates = TemplateSet::default()
            .with_rule("door", "door-sign", false)
            .with_rule("door", "ignored", true);
        let mut mirror = MarkerMirror::new(templates);

        let events = mirror.apply(&snap(
            1,
            vec![marker("a", "door", true), marker("b", "window", true)],
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id().as_str(), "a");
        assert_eq!(mirror.template_of("a"), Some("door-sign"));
        assert!(matches!(events[0], MirrorEvent::Spawn { scale: None, .. }));
        assert!(!mirror.is_live("b"));
    }

    #[test]
    fn markers_missing_from_snapshot_are_released() {
        let mut mirror = MarkerMirror::new(TemplateSet::single("pin"));
        mirror.apply(&snap(1, vec![marker("a", "", true), marker("b", "", true)]));

        let events = mirror.apply(&snap(2, vec![marker("b", "", true)]));
        assert!(events.contains(&MirrorEvent::Release { id: "a".into() }));
        assert!(mirror.is_live("b"));

        let released = mirror.clear();
        assert_eq!(released, vec![MirrorEvent::Release { id: "b".into() }]);
    }

    #[test]
    fn untracked_unknown_marker_is_ignored() {
        let mut mirror = MarkerMirror::new(TemplateSet::single("pin"));
        assert!(mirror.apply(&snap(1, vec![marker("a", "", false)])).is_empty());
    }

    #[test]
    fn events_serialize_with_tag() {
        let value = serde_json::to_value(MirrorEvent::Release { id: "7".into() }).unwrap();
        assert_eq!(value["event"], "release");
        assert_eq!(value["id"], "7");
    }
}
