use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::async_task::task_with_timeout_and_exponential_backoff;
use crate::async_task::PeriodicTask;
use crate::async_task::Schedule;
use crate::BackoffPolicy;
use crate::Error;
use crate::PERIODIC_TASK_FAILURES;

fn test_policy() -> BackoffPolicy {
    BackoffPolicy {
        base_delay_ms: 10,
        max_delay_ms: 100,
        timeout_ms: 1000,
        max_retries: 3,
    }
}

#[tokio::test(start_paused = true)]
async fn test_task_with_timeout_and_exponential_backoff_success() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let task = move || {
        let counter = counter_clone.clone();
        async move {
            let current = counter.fetch_add(1, Ordering::SeqCst);
            if current == 0 {
                Err(Error::Fatal("First attempt fails".to_string()))
            } else {
                Ok::<_, crate::Error>(current)
            }
        }
    };

    let result = task_with_timeout_and_exponential_backoff(task, test_policy()).await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 2); // 1 failure + 1 success
}

#[tokio::test(start_paused = true)]
async fn test_task_with_timeout_and_exponential_backoff_max_retries() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let task = move || {
        let counter = counter_clone.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(Error::Fatal("Always fails".to_string()))
        }
    };

    let result = task_with_timeout_and_exponential_backoff(task, test_policy()).await;

    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_task_with_timeout_and_exponential_backoff_timeout() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let task = move || {
        let counter = counter_clone.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            // Longer than the per-attempt timeout
            tokio::time::sleep(Duration::from_millis(5000)).await;
            Ok::<u32, Error>(0)
        }
    };

    let result = task_with_timeout_and_exponential_backoff(task, test_policy()).await;

    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn periodic_task_runs_every_period_until_cancelled() {
    let counter = Arc::new(AtomicU32::new(0));
    let token = CancellationToken::new();

    let c = counter.clone();
    let handle = PeriodicTask::new(
        "test_fixed_delay",
        Duration::from_millis(100),
        Schedule::FixedDelay,
        token.clone(),
    )
    .spawn(move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    token.cancel();
    handle.await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn periodic_task_survives_failing_and_panicking_cycles() {
    let counter = Arc::new(AtomicU32::new(0));
    let token = CancellationToken::new();
    let name = "test_unstable_task";
    let failures_before = PERIODIC_TASK_FAILURES.with_label_values(&[name]).get();

    let c = counter.clone();
    let handle = PeriodicTask::new(name, Duration::from_millis(100), Schedule::FixedRate, token.clone())
        .spawn(move || {
            let c = c.clone();
            async move {
                match c.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(Error::Fatal("store down".into())),
                    1 => panic!("listener bug"),
                    _ => Ok(()),
                }
            }
        });

    tokio::time::sleep(Duration::from_millis(450)).await;
    token.cancel();
    handle.await.expect("scheduler must not die");

    assert!(counter.load(Ordering::SeqCst) >= 4);
    assert_eq!(
        PERIODIC_TASK_FAILURES.with_label_values(&[name]).get() - failures_before,
        2
    );
}
