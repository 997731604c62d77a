use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::constants::RELEASE_TOPIC;
use crate::test_utils::enable_logger;
use crate::test_utils::FailingListener;
use crate::test_utils::RecordBuilder;
use crate::test_utils::RecordingListener;
use crate::BackoffPolicy;
use crate::ChangeRecord;
use crate::Error;
use crate::MemoryChangeLog;
use crate::MockChangeLogStore;
use crate::ScannerConfig;
use crate::StorageError;

fn scanner_config(batch_size: usize) -> ScannerConfig {
    ScannerConfig {
        batch_size,
        missing_record_max_age: 3,
        max_missing_records: 100,
        ..Default::default()
    }
}

fn setup(
    batch_size: usize
) -> (Arc<MemoryChangeLog>, Arc<LogScanner<MemoryChangeLog>>, Arc<RecordingListener>) {
    let log = Arc::new(MemoryChangeLog::new());
    let scanner = Arc::new(LogScanner::new(
        log.clone(),
        &scanner_config(batch_size),
        CancellationToken::new(),
    ));
    let recorder = Arc::new(RecordingListener::new());
    scanner.add_listener(recorder.clone());
    (log, scanner, recorder)
}

#[tokio::test]
async fn test_initialize_skips_existing_records() {
    enable_logger();
    let (log, scanner, recorder) = setup(10);
    log.append("app1+default+ns1");
    log.append("app1+default+ns2");

    assert_eq!(scanner.initialize(BackoffPolicy::default()).await.unwrap(), 2);
    scanner.tick().await.unwrap();

    assert!(recorder.ids().is_empty());
    assert_eq!(scanner.high_water_mark(), 2);
}

#[tokio::test]
async fn test_every_record_dispatched_exactly_once() {
    let (log, scanner, recorder) = setup(3);
    scanner.initialize(BackoffPolicy::default()).await.unwrap();

    for round in 0..4 {
        for i in 0..5 {
            log.append(format!("app{round}+default+ns{i}"));
        }
        scanner.tick().await.unwrap();
        // Idle tick in between must not replay anything
        scanner.tick().await.unwrap();
    }

    let ids = recorder.ids();
    assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
    assert_eq!(scanner.high_water_mark(), 20);
    assert!(recorder.topics().iter().all(|t| t == RELEASE_TOPIC));
    assert!(scanner.missing_ids().is_empty());
}

#[tokio::test]
async fn test_gap_is_tracked_then_resolved() {
    let (log, scanner, recorder) = setup(10);
    let (builder, r1) = RecordBuilder::new(1).record("a+default+ns");
    let (builder, r2) = builder.record("b+default+ns");
    let (_builder, r4) = builder.skip(1).record("d+default+ns");
    log.insert(r1);
    log.insert(r2);
    scanner.initialize(BackoffPolicy::default()).await.unwrap();

    // 4 is visible before 3 commits
    log.insert(r4);
    scanner.tick().await.unwrap();
    assert_eq!(recorder.ids(), vec![4]);
    assert_eq!(scanner.missing_ids(), vec![3]);

    log.insert(ChangeRecord::new(3, "c+default+ns", 1));
    scanner.tick().await.unwrap();

    assert_eq!(recorder.ids(), vec![4, 3]);
    assert!(scanner.missing_ids().is_empty());
    assert_eq!(scanner.high_water_mark(), 4);
}

#[tokio::test]
async fn test_never_retrievable_id_is_looked_up_max_age_times() {
    enable_logger();
    let lookups = Arc::new(AtomicUsize::new(0));
    let forward_calls = Arc::new(AtomicUsize::new(0));

    let mut store = MockChangeLogStore::new();
    store.expect_find_newest_id().returning(|| Ok(Some(10)));
    let calls = forward_calls.clone();
    store.expect_find_after().returning(move |min, _| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            assert_eq!(min, 10);
            Ok(vec![ChangeRecord::new(12, "app+default+ns", 1)])
        } else {
            Ok(vec![])
        }
    });
    let counter = lookups.clone();
    store.expect_find_by_ids().returning(move |ids| {
        assert_eq!(ids, &[11]);
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(vec![])
    });

    let scanner = LogScanner::new(Arc::new(store), &scanner_config(10), CancellationToken::new());
    scanner.initialize(BackoffPolicy::default()).await.unwrap();

    for _ in 0..6 {
        scanner.tick().await.unwrap();
    }

    assert_eq!(lookups.load(Ordering::SeqCst), 3);
    assert!(scanner.missing_ids().is_empty());
    assert_eq!(scanner.high_water_mark(), 12);
}

#[tokio::test]
async fn test_store_error_keeps_mark_and_retries_next_tick() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut store = MockChangeLogStore::new();
    store.expect_find_newest_id().returning(|| Ok(Some(5)));
    let c = calls.clone();
    store.expect_find_after().returning(move |min, _| {
        assert_eq!(min, 5, "mark must not move past unread data");
        match c.fetch_add(1, Ordering::SeqCst) {
            0 => Err(StorageError::Unavailable("connection refused".into()).into()),
            1 => Ok(vec![ChangeRecord::new(6, "app+default+ns", 1)]),
            _ => unreachable!(),
        }
    });

    let scanner = LogScanner::new(Arc::new(store), &scanner_config(10), CancellationToken::new());
    let recorder = Arc::new(RecordingListener::new());
    scanner.add_listener(recorder.clone());
    scanner.initialize(BackoffPolicy::default()).await.unwrap();

    let first = scanner.tick().await;
    assert!(matches!(first, Err(Error::Storage(StorageError::Unavailable(_)))));
    assert_eq!(scanner.high_water_mark(), 5);

    scanner.tick().await.unwrap();
    assert_eq!(recorder.ids(), vec![6]);
    assert_eq!(scanner.high_water_mark(), 6);
}

#[tokio::test]
async fn test_failing_listener_does_not_block_others() {
    let log = Arc::new(MemoryChangeLog::new());
    let scanner = LogScanner::new(log.clone(), &scanner_config(10), CancellationToken::new());
    let recorder = Arc::new(RecordingListener::new());
    scanner.add_listener(Arc::new(FailingListener));
    scanner.add_listener(recorder.clone());
    scanner.initialize(BackoffPolicy::default()).await.unwrap();

    log.append("app+default+ns");
    scanner.tick().await.unwrap();

    assert_eq!(recorder.ids(), vec![1]);
    assert_eq!(scanner.high_water_mark(), 1);
}

#[tokio::test]
async fn test_mark_missing_replays_known_record() {
    let (log, scanner, recorder) = setup(10);
    scanner.initialize(BackoffPolicy::default()).await.unwrap();
    log.append("app+default+ns");
    scanner.tick().await.unwrap();

    assert!(!scanner.mark_missing(0));
    assert!(!scanner.mark_missing(2), "above the mark is left to the forward scan");
    assert!(scanner.mark_missing(1));
    assert!(!scanner.mark_missing(1));

    scanner.tick().await.unwrap();
    assert_eq!(recorder.ids(), vec![1, 1]);
    assert!(scanner.missing_ids().is_empty());
}

#[tokio::test]
async fn test_listener_added_later_sees_only_later_records() {
    let (log, scanner, first) = setup(10);
    scanner.initialize(BackoffPolicy::default()).await.unwrap();
    log.append("a+default+ns");
    scanner.tick().await.unwrap();

    let late = Arc::new(RecordingListener::new());
    assert!(scanner.add_listener(late.clone()));
    assert!(!scanner.add_listener(late.clone()));
    log.append("b+default+ns");
    scanner.tick().await.unwrap();

    assert_eq!(first.ids(), vec![1, 2]);
    assert_eq!(late.ids(), vec![2]);
}

#[tokio::test]
async fn test_cancelled_scan_stops_before_reading() {
    let log = Arc::new(MemoryChangeLog::new());
    let token = CancellationToken::new();
    let scanner = LogScanner::new(log.clone(), &scanner_config(10), token.clone());
    let recorder = Arc::new(RecordingListener::new());
    scanner.add_listener(recorder.clone());

    log.append("a+default+ns");
    token.cancel();
    scanner.tick().await.unwrap();

    assert!(recorder.ids().is_empty());
    assert_eq!(scanner.high_water_mark(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_polls_on_fixed_delay_until_cancelled() {
    let log = Arc::new(MemoryChangeLog::new());
    let token = CancellationToken::new();
    let scanner = Arc::new(LogScanner::new(log.clone(), &scanner_config(10), token.clone()));
    let recorder = Arc::new(RecordingListener::new());
    scanner.add_listener(recorder.clone());
    scanner.initialize(BackoffPolicy::default()).await.unwrap();

    let handle = scanner.start(Duration::from_millis(100));

    log.append("a+default+ns");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(recorder.ids(), vec![1]);

    log.append("b+default+ns");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(recorder.ids(), vec![1, 2]);

    token.cancel();
    handle.await.unwrap();

    log.append("c+default+ns");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(recorder.ids(), vec![1, 2]);
}
