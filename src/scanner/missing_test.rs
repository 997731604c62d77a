use super::*;

#[test]
fn track_starts_at_age_zero_and_ignores_duplicates() {
    let mut tracker = MissingRecordTracker::new(3, 10);

    assert!(tracker.track(5));
    assert!(!tracker.track(5));
    assert_eq!(tracker.age_of(5), Some(0));
    assert_eq!(tracker.len(), 1);
}

#[test]
fn age_drops_id_after_max_age_failed_lookups() {
    let mut tracker = MissingRecordTracker::new(3, 10);
    tracker.track(5);

    assert!(tracker.age(&[5]).is_empty());
    assert!(tracker.age(&[5]).is_empty());
    assert_eq!(tracker.age_of(5), Some(2));

    assert_eq!(tracker.age(&[5]), vec![5]);
    assert!(!tracker.contains(5));

    // Gone for good: later aging is a no-op
    assert!(tracker.age(&[5]).is_empty());
}

#[test]
fn age_only_touches_looked_up_ids() {
    let mut tracker = MissingRecordTracker::new(2, 10);
    tracker.track(1);
    tracker.track(2);

    tracker.age(&[1]);

    assert_eq!(tracker.age_of(1), Some(1));
    assert_eq!(tracker.age_of(2), Some(0));
}

#[test]
fn resolve_removes_id() {
    let mut tracker = MissingRecordTracker::new(3, 10);
    tracker.track(7);

    assert!(tracker.resolve(7));
    assert!(!tracker.resolve(7));
    assert!(tracker.is_empty());
}

#[test]
fn capacity_bounds_tracked_ids() {
    let mut tracker = MissingRecordTracker::new(3, 2);

    assert!(tracker.track(1));
    assert!(tracker.track(2));
    assert!(tracker.is_full());
    assert!(!tracker.track(3));
    assert_eq!(tracker.ids(), vec![1, 2]);
}
