use std::collections::BTreeSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::sleep_until;
use tracing::debug;
use tracing::info;

use super::normalize_subject;
use super::ChangeNotification;
use super::LongPollSlot;
use super::SlotHandle;
use crate::ChangeListener;
use crate::ChangeRecord;
use crate::LongPollConfig;
use crate::Result;
use crate::LONG_POLL_OUTCOMES;
use crate::LONG_POLL_PENDING;

type SlotIndex = DashMap<String, BTreeSet<Arc<LongPollSlot>>>;

/// Registry of pending long-poll slots by normalized subject.
///
/// Registered as a change listener: a record completes every slot waiting on
/// its subject. Slots leave the index on whichever terminal transition wins.
#[derive(Debug)]
pub struct LongPollManager {
    slots: Arc<SlotIndex>,
    next_id: AtomicU64,
    pending: Arc<AtomicUsize>,
    config: LongPollConfig,
}

impl LongPollManager {
    pub fn new(config: LongPollConfig) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            pending: Arc::new(AtomicUsize::new(0)),
            config,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Registers a slot waiting on `subjects` for at most `timeout`.
    ///
    /// Returns immediately; the caller awaits [`SlotHandle::wait`]. Must be
    /// called inside a tokio runtime, which drives the timeout.
    pub fn create_slot<I, S>(
        &self,
        subjects: I,
        timeout: Duration,
    ) -> SlotHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (slot, receiver) = LongPollSlot::new(id, subjects, timeout, self.config.subject_ignore_case);
        let slot = Arc::new(slot);

        self.pending.fetch_add(1, Ordering::SeqCst);
        LONG_POLL_PENDING.inc();

        let slots = self.slots.clone();
        let pending = self.pending.clone();
        let weak = Arc::downgrade(&slot);
        slot.on_completion(move |outcome| {
            pending.fetch_sub(1, Ordering::SeqCst);
            LONG_POLL_PENDING.dec();
            LONG_POLL_OUTCOMES.with_label_values(&[outcome.label()]).inc();
            if let Some(slot) = weak.upgrade() {
                deregister(&slots, &slot);
            }
        });

        for subject in slot.normalized_subjects() {
            self.slots.entry(subject.to_string()).or_default().insert(slot.clone());
        }
        // Completed through a subject indexed earlier in the loop: its hook ran
        // before the remaining subjects were indexed
        if !slot.is_pending() {
            deregister(&self.slots, &slot);
        }

        let deadline = slot.deadline();
        let timer_slot = slot.clone();
        let timer = tokio::spawn(async move {
            sleep_until(deadline).await;
            if timer_slot.expire() {
                debug!(id = timer_slot.id(), "slot timed out");
            }
        });
        slot.set_timer(timer);

        SlotHandle::new(slot, receiver)
    }

    /// Number of slots not yet terminated
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Slots currently indexed under `subject`
    pub fn slots_for(
        &self,
        subject: &str,
    ) -> usize {
        self.slots
            .get(&normalize_subject(subject, self.config.subject_ignore_case))
            .map(|set| set.len())
            .unwrap_or(0)
    }

    /// Completes every slot waiting on `record.subject`. Large fan-outs are
    /// completed in batches on a separate task. Returns the number of slots
    /// matched.
    pub fn notify(
        &self,
        record: &ChangeRecord,
    ) -> usize {
        let subject = normalize_subject(&record.subject, self.config.subject_ignore_case);
        // Taken out of the index before completing: completion hooks touch the index
        let Some((_, matched)) = self.slots.remove(&subject) else {
            return 0;
        };
        let matched: Vec<Arc<LongPollSlot>> = matched.into_iter().collect();
        let count = matched.len();
        let notification = ChangeNotification::new(record.subject.clone(), record.id);

        let batch = self.config.notification_batch.max(1);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) if count > batch => {
                let interval = self.config.notification_batch_interval();
                info!(
                    id = record.id,
                    subject = %record.subject,
                    slots = count,
                    batch,
                    "completing long-poll slots in batches"
                );
                runtime.spawn(async move {
                    let mut chunks = matched.chunks(batch).peekable();
                    while let Some(chunk) = chunks.next() {
                        complete_all(chunk, &notification);
                        if chunks.peek().is_some() {
                            tokio::time::sleep(interval).await;
                        }
                    }
                });
            }
            _ => complete_all(&matched, &notification),
        }

        count
    }
}

fn complete_all(
    slots: &[Arc<LongPollSlot>],
    notification: &ChangeNotification,
) {
    for slot in slots {
        slot.complete(vec![notification.clone()]);
    }
}

fn deregister(
    slots: &SlotIndex,
    slot: &Arc<LongPollSlot>,
) {
    for subject in slot.normalized_subjects() {
        slots.remove_if_mut(subject, |_, set| {
            set.remove(slot);
            set.is_empty()
        });
    }
}

impl ChangeListener for LongPollManager {
    fn handle(
        &self,
        record: &ChangeRecord,
        _topic: &str,
    ) -> Result<()> {
        self.notify(record);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "long_poll"
    }
}
