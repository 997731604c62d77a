use std::sync::Arc;

use super::*;
use crate::test_utils::FailingListener;
use crate::test_utils::PanickingListener;
use crate::test_utils::RecordingListener;
use crate::ChangeRecord;
use crate::Error;
use crate::LISTENER_FAILURES;

fn record(id: u64) -> ChangeRecord {
    ChangeRecord::new(id, "app1+default+application", 1)
}

#[test]
fn add_keeps_registration_order_and_rejects_duplicates() {
    let registry = ListenerRegistry::new();
    let first: Arc<dyn ChangeListener> = Arc::new(RecordingListener::new());
    let second: Arc<dyn ChangeListener> = Arc::new(RecordingListener::new());

    assert!(registry.add(first.clone()));
    assert!(registry.add(second.clone()));
    assert!(!registry.add(first.clone()));
    assert_eq!(registry.len(), 2);

    assert!(registry.remove(&first));
    assert!(!registry.remove(&first));
    assert_eq!(registry.len(), 1);
}

#[test]
fn dispatch_calls_listeners_in_order() {
    let registry = ListenerRegistry::new();
    let mut seq = mockall::Sequence::new();

    let mut first = MockChangeListener::new();
    first
        .expect_handle()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|r, topic| {
            assert_eq!(r.id, 1);
            assert_eq!(topic, "t");
            Ok(())
        });
    let mut second = MockChangeListener::new();
    first.expect_name().return_const("first");
    second.expect_handle().times(1).in_sequence(&mut seq).returning(|_, _| Ok(()));
    second.expect_name().return_const("second");

    registry.add(Arc::new(first));
    registry.add(Arc::new(second));

    assert_eq!(registry.dispatch(&record(1), "t"), 0);
}

#[test]
fn dispatch_isolates_errors_and_panics() {
    let registry = ListenerRegistry::new();
    let recorder = Arc::new(RecordingListener::new());

    let failing_before = LISTENER_FAILURES.with_label_values(&["failing"]).get();
    let panicking_before = LISTENER_FAILURES.with_label_values(&["panicking"]).get();

    registry.add(Arc::new(FailingListener));
    registry.add(Arc::new(PanickingListener));
    registry.add(recorder.clone());

    assert_eq!(registry.dispatch(&record(1), "t"), 2);
    assert_eq!(registry.dispatch(&record(2), "t"), 2);

    assert_eq!(recorder.ids(), vec![1, 2]);
    assert_eq!(LISTENER_FAILURES.with_label_values(&["failing"]).get() - failing_before, 2);
    assert_eq!(
        LISTENER_FAILURES.with_label_values(&["panicking"]).get() - panicking_before,
        2
    );
}

#[test]
fn mock_listener_error_is_counted_under_its_name() {
    let registry = ListenerRegistry::new();
    let mut listener = MockChangeListener::new();
    listener
        .expect_handle()
        .returning(|_, _| Err(Error::Listener("boom".to_string())));
    listener.expect_name().return_const("mock_rejecting");
    let before = LISTENER_FAILURES.with_label_values(&["mock_rejecting"]).get();

    registry.add(Arc::new(listener));

    assert_eq!(registry.dispatch(&record(9), "t"), 1);
    assert_eq!(LISTENER_FAILURES.with_label_values(&["mock_rejecting"]).get() - before, 1);
}
