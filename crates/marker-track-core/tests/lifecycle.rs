use std::sync::{Arc, Mutex};

use marker_track_core::{Detection, MarkerSnapshot, MarkerTracker, Pose, TrackerConfig, Upsert};
use nalgebra::{UnitQuaternion, Vector2, Vector3};

fn pose(x: f32, y: f32, z: f32) -> Pose {
    Pose::from_position(Vector3::new(x, y, z))
}

fn detection(id: &str, p: Pose, t: f64) -> Detection {
    Detection::new(id, id, p, Vector2::new(0.15, 0.15), t)
}

fn tracker(timeout: f64, interval: f64) -> MarkerTracker {
    MarkerTracker::new(
        TrackerConfig::default()
            .with_tracking_lost_timeout(timeout)
            .with_min_publish_interval(interval),
    )
    .expect("valid config")
}

fn recording_subscriber(tracker: &mut MarkerTracker) -> Arc<Mutex<Vec<MarkerSnapshot>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _ = tracker.subscribe(move |s: &MarkerSnapshot| sink.lock().unwrap().push(s.clone()));
    seen
}

#[test]
fn lost_marker_is_reported_untracked_exactly_once_then_absent() {
    let p1 = pose(1.0, 2.0, 3.0);
    let mut t = tracker(2.0, 1.0);
    let seen = recording_subscriber(&mut t);

    t.report_detection(detection("A", p1, 0.0));

    let s1 = t.tick(1.0).expect("publish at t=1");
    let a = s1.get("A").expect("A present");
    assert!(a.is_tracked);
    assert_eq!(a.pose, p1);

    let s2 = t.tick(2.1).expect("publish at t=2.1");
    assert!(!s2.get("A").expect("A still present").is_tracked);

    let s3 = t.tick(4.2).expect("publish at t=4.2");
    assert!(s3.get("A").is_none());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    let untracked_reports = seen
        .iter()
        .filter(|s| s.get("A").is_some_and(|m| !m.is_tracked))
        .count();
    assert_eq!(untracked_reports, 1);
}

#[test]
fn publishes_are_rate_limited_under_continuous_detections() {
    let interval = 0.5;
    let mut t = tracker(2.0, interval);
    let seen = recording_subscriber(&mut t);

    // 60 Hz host loop with a detection every frame for three seconds.
    for frame in 0..180 {
        let now = frame as f64 / 60.0;
        t.report_detection(detection("A", pose(now as f32, 0.0, 0.0), now));
        t.tick(now);
    }

    let seen = seen.lock().unwrap();
    assert!(seen.len() >= 5, "expected regular publishes, got {}", seen.len());
    for pair in seen.windows(2) {
        assert!(pair[1].published_at - pair[0].published_at > interval);
        assert_eq!(pair[1].sequence, pair[0].sequence + 1);
    }
    assert!(seen.iter().all(|s| s.get("A").unwrap().is_tracked));
}

#[test]
fn repeated_sweeps_neither_reflip_nor_resurrect() {
    let mut t = tracker(1.0, 0.0);
    t.report_detection(detection("A", pose(0.0, 0.0, 0.0), 0.0));

    let flips: Vec<bool> = [2.0, 2.5, 3.0, 3.5]
        .into_iter()
        .map(|now| {
            t.tick(now)
                .expect("zero interval publishes every tick")
                .get("A")
                .is_some()
        })
        .collect();
    assert_eq!(flips, vec![true, false, false, false]);
    assert!(t.store().is_empty());
}

#[test]
fn two_adapters_same_id_last_write_wins() {
    let mut t = tracker(2.0, 2.0);
    let from_qr = detection("shared", pose(1.0, 0.0, 0.0), 5.0);
    let rotated = Pose::new(
        Vector3::new(-1.0, 0.0, 0.0),
        UnitQuaternion::from_euler_angles(0.0, 0.3, 0.0),
    );
    let from_aruco = detection("shared", rotated, 5.0);

    assert_eq!(t.report_detection(from_qr), Some(Upsert::Created));
    assert_eq!(t.report_detection(from_aruco), Some(Upsert::Updated));

    let snapshot = t.tick(5.0).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get("shared").unwrap().pose, rotated);
}

#[test]
fn detection_without_pose_is_dropped() {
    let mut t = tracker(2.0, 2.0);
    t.report_detection(detection("A", pose(1.0, 1.0, 1.0), 0.0));

    let mut no_pose = detection("A", pose(9.0, 9.0, 9.0), 0.5);
    no_pose.pose = None;
    let mut unknown_no_pose = detection("B", pose(0.0, 0.0, 0.0), 0.5);
    unknown_no_pose.pose = None;

    let stats = t.ingest(vec![no_pose, unknown_no_pose]);
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.applied(), 0);

    let snapshot = t.tick(0.5).unwrap();
    assert_eq!(snapshot.len(), 1);
    let a = snapshot.get("A").unwrap();
    assert_eq!(a.pose, pose(1.0, 1.0, 1.0));
    assert_eq!(a.last_seen_time, 0.0);
}

#[test]
fn marker_seen_again_after_being_reported_lost_comes_back_tracked() {
    let mut t = tracker(1.0, 0.0);
    t.report_detection(detection("A", pose(0.0, 0.0, 0.0), 0.0));
    assert!(!t.tick(1.5).unwrap().get("A").unwrap().is_tracked);

    t.report_detection(detection("A", pose(2.0, 0.0, 0.0), 1.6));
    let s = t.tick(1.7).unwrap();
    let a = s.get("A").expect("revived before purge");
    assert!(a.is_tracked);
    assert_eq!(a.pose, pose(2.0, 0.0, 0.0));
}

#[test]
fn unsubscribed_consumer_stops_receiving() {
    let mut t = tracker(2.0, 0.0);
    let count = Arc::new(Mutex::new(0usize));
    let c = Arc::clone(&count);
    let handle = t.subscribe(move |_| *c.lock().unwrap() += 1);

    t.tick(0.0);
    t.tick(1.0);
    assert!(t.unsubscribe(handle));
    t.tick(2.0);

    assert_eq!(*count.lock().unwrap(), 2);
}

#[test]
fn snapshot_is_isolated_from_later_store_changes() {
    let mut t = tracker(2.0, 0.0);
    t.report_detection(detection("A", pose(1.0, 0.0, 0.0), 0.0));
    let before = t.tick(0.0).unwrap();

    t.report_detection(detection("A", pose(5.0, 0.0, 0.0), 0.5));
    t.report_detection(detection("B", pose(0.0, 0.0, 0.0), 0.5));

    assert_eq!(before.len(), 1);
    assert_eq!(before.get("A").unwrap().pose, pose(1.0, 0.0, 0.0));
}
