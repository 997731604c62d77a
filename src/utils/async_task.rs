use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;
use crate::SystemError;
use crate::PERIODIC_TASK_FAILURES;

/// Retries `task` with a per-attempt timeout and exponential backoff bounded by
/// `policy.max_delay_ms`. The last error is returned once attempts run out.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: Future<Output = Result<P>>,
{
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let mut last_error = String::new();

    for attempt in 1..=policy.max_retries {
        match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) => {
                warn!(attempt, "task failed with error: {:?}", e);
                last_error = e.to_string();
            }
            Err(_) => {
                warn!(attempt, "task timed out after {:?}", timeout_duration);
                last_error = SystemError::RetryTimeout(timeout_duration).to_string();
            }
        }

        if attempt < policy.max_retries {
            sleep(delay).await;
            delay = (delay * 2).min(max_delay);
        }
    }

    warn!("Task failed after {} retries", policy.max_retries);
    Err(SystemError::RetryExhausted {
        attempts: policy.max_retries,
        last_error,
    }
    .into())
}

// Helper function to spawn tasks and track their JoinHandles
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        match task_fn().await {
            Ok(()) | Err(Error::Exit) => debug!("spawned task: {name} finished"),
            Err(e) => error!("spawned task: {name} stopped or encountered an error: {:?}", e),
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}

/// How the next run of a periodic task is placed in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Next run starts `period` after the previous run finished
    FixedDelay,
    /// Runs start every `period`; a run that overruns delays the next tick
    FixedRate,
}

/// Explicit periodic task: decouples what a cycle does from how it is scheduled.
///
/// A cycle's error or panic is logged and counted; the loop keeps going until
/// the cancellation token fires.
pub struct PeriodicTask {
    name: &'static str,
    period: Duration,
    schedule: Schedule,
    cancel: CancellationToken,
}

impl PeriodicTask {
    pub fn new(
        name: &'static str,
        period: Duration,
        schedule: Schedule,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name,
            period,
            schedule,
            cancel,
        }
    }

    /// Spawns the loop. The first run happens one `period` after spawning.
    pub fn spawn<F, Fut>(
        self,
        mut cycle: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        tokio::spawn(async move {
            debug!(task = self.name, period = ?self.period, "periodic task started");

            let mut interval = tokio::time::interval_at(
                tokio::time::Instant::now() + self.period,
                self.period,
            );
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                match self.schedule {
                    Schedule::FixedDelay => {
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = sleep(self.period) => {}
                        }
                    }
                    Schedule::FixedRate => {
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = interval.tick() => {}
                        }
                    }
                }

                run_cycle(self.name, &mut cycle).await;
            }

            debug!(task = self.name, "periodic task stopped");
        })
    }
}

/// Runs one cycle with panic isolation
pub(crate) async fn run_cycle<F, Fut>(
    name: &str,
    cycle: &mut F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(cycle()).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(Error::Exit)) => debug!(task = name, "cycle exited early"),
        Ok(Err(e)) => {
            PERIODIC_TASK_FAILURES.with_label_values(&[name]).inc();
            error!(task = name, "periodic cycle failed: {:?}", e);
        }
        Err(_) => {
            PERIODIC_TASK_FAILURES.with_label_values(&[name]).inc();
            error!(task = name, "periodic cycle panicked");
        }
    }
}
