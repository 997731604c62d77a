use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use arc_swap::ArcSwap;
#[cfg(test)]
use mockall::automock;
use tracing::error;
use tracing::trace;

use crate::ChangeRecord;
use crate::Result;
use crate::LISTENER_FAILURES;

/// Consumer of change records fanned out by the scanner.
///
/// `handle` runs on the scanner's dispatch path: it must not block. Slow
/// work belongs on a task the listener spawns itself.
#[cfg_attr(test, automock)]
pub trait ChangeListener: Send + Sync + 'static {
    fn handle(
        &self,
        record: &ChangeRecord,
        topic: &str,
    ) -> Result<()>;

    /// Label used in logs and failure metrics
    fn name(&self) -> &'static str {
        "anonymous"
    }
}

/// Ordered, duplicate-free set of listeners.
///
/// Registration swaps a new snapshot in; dispatch iterates whatever snapshot
/// was current when it started, so listeners added mid-dispatch only see the
/// next record.
pub struct ListenerRegistry {
    listeners: ArcSwap<Vec<Arc<dyn ChangeListener>>>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let names: Vec<&'static str> = self.listeners.load().iter().map(|l| l.name()).collect();
        f.debug_struct("ListenerRegistry").field("listeners", &names).finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Appends `listener` unless the same instance is already registered
    pub fn add(
        &self,
        listener: Arc<dyn ChangeListener>,
    ) -> bool {
        let mut added = false;
        self.listeners.rcu(|current| {
            if current.iter().any(|l| same_listener(l, &listener)) {
                added = false;
                return Arc::clone(current);
            }
            added = true;
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(listener.clone());
            Arc::new(next)
        });
        added
    }

    pub fn remove(
        &self,
        listener: &Arc<dyn ChangeListener>,
    ) -> bool {
        let mut removed = false;
        self.listeners.rcu(|current| {
            let next: Vec<_> = current.iter().filter(|l| !same_listener(l, listener)).cloned().collect();
            removed = next.len() != current.len();
            Arc::new(next)
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hands `record` to every listener in registration order.
    ///
    /// A listener's error or panic is logged and counted, and never stops the
    /// listeners after it. Returns the number of failed listeners.
    pub fn dispatch(
        &self,
        record: &ChangeRecord,
        topic: &str,
    ) -> usize {
        let snapshot = self.listeners.load();
        let mut failures = 0;

        for listener in snapshot.iter() {
            match catch_unwind(AssertUnwindSafe(|| listener.handle(record, topic))) {
                Ok(Ok(())) => {
                    trace!(id = record.id, listener = listener.name(), "record handled");
                }
                Ok(Err(e)) => {
                    failures += 1;
                    LISTENER_FAILURES.with_label_values(&[listener.name()]).inc();
                    error!(
                        id = record.id,
                        subject = %record.subject,
                        listener = listener.name(),
                        "listener failed: {:?}",
                        e
                    );
                }
                Err(_) => {
                    failures += 1;
                    LISTENER_FAILURES.with_label_values(&[listener.name()]).inc();
                    error!(
                        id = record.id,
                        subject = %record.subject,
                        listener = listener.name(),
                        "listener panicked"
                    );
                }
            }
        }

        failures
    }
}

fn same_listener(
    a: &Arc<dyn ChangeListener>,
    b: &Arc<dyn ChangeListener>,
) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
