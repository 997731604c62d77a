use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use crate::constants::PROPERTIES_SUFFIX;

/// One changed subject as reported back to a waiting client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// Subject exactly as the client asked for it
    pub subject: String,
    /// Id of the change record that completed the wait
    pub notification_id: u64,
}

impl ChangeNotification {
    pub fn new(
        subject: impl Into<String>,
        notification_id: u64,
    ) -> Self {
        Self {
            subject: subject.into(),
            notification_id,
        }
    }
}

/// Terminal result of a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    Changed(Vec<ChangeNotification>),
    TimedOut,
    Aborted,
}

impl SlotOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SlotOutcome::Changed(_) => "completed",
            SlotOutcome::TimedOut => "timed_out",
            SlotOutcome::Aborted => "aborted",
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Pending = 0,
    Completed = 1,
    TimedOut = 2,
    Aborted = 3,
}

impl From<u8> for SlotState {
    fn from(v: u8) -> Self {
        match v {
            0 => SlotState::Pending,
            1 => SlotState::Completed,
            2 => SlotState::TimedOut,
            _ => SlotState::Aborted,
        }
    }
}

type TimeoutHook = Box<dyn FnOnce() + Send>;
type CompletionHook = Box<dyn FnOnce(&SlotOutcome) + Send>;

#[derive(Default)]
struct Hooks {
    on_timeout: Vec<TimeoutHook>,
    on_completion: Vec<CompletionHook>,
    /// Set together with draining the lists, under the same lock
    fired: Option<SlotOutcome>,
}

/// A client's pending wait for changes on a set of subjects.
///
/// Exactly one of completion, timeout or abort wins; the state moves out of
/// `Pending` with a compare-and-set and every later attempt is a no-op.
/// Ordering compares the creation id only.
pub struct LongPollSlot {
    id: u64,
    /// normalized -> as supplied by the client
    subjects: HashMap<String, String>,
    ignore_case: bool,
    timeout: Duration,
    deadline: Instant,
    state: AtomicU8,
    hooks: Mutex<Hooks>,
    sender: Mutex<Option<oneshot::Sender<SlotOutcome>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for LongPollSlot {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LongPollSlot")
            .field("id", &self.id)
            .field("subjects", &self.subjects.values().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .field("state", &self.state())
            .finish()
    }
}

impl LongPollSlot {
    pub(crate) fn new<I, S>(
        id: u64,
        subjects: I,
        timeout: Duration,
        ignore_case: bool,
    ) -> (Self, oneshot::Receiver<SlotOutcome>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let subjects = subjects
            .into_iter()
            .map(|s| {
                let original: String = s.into();
                (normalize_subject(&original, ignore_case), original)
            })
            .collect();
        let (tx, rx) = oneshot::channel();

        let slot = Self {
            id,
            subjects,
            ignore_case,
            timeout,
            deadline: Instant::now() + timeout,
            state: AtomicU8::new(SlotState::Pending as u8),
            hooks: Mutex::new(Hooks::default()),
            sender: Mutex::new(Some(tx)),
            timer: Mutex::new(None),
        };
        (slot, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SlotState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == SlotState::Pending
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Subjects in the form the client supplied
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.subjects.values().map(String::as_str)
    }

    pub(crate) fn normalized_subjects(&self) -> impl Iterator<Item = &str> {
        self.subjects.keys().map(String::as_str)
    }

    pub fn outcome(&self) -> Option<SlotOutcome> {
        self.hooks.lock().fired.clone()
    }

    /// Runs `hook` if the slot times out. Registered after a timeout, it runs
    /// immediately; after any other outcome it never runs.
    pub fn on_timeout<F>(
        &self,
        hook: F,
    ) where
        F: FnOnce() + Send + 'static,
    {
        let mut hooks = self.hooks.lock();
        match hooks.fired.clone() {
            None => hooks.on_timeout.push(Box::new(hook)),
            Some(SlotOutcome::TimedOut) => {
                drop(hooks);
                hook();
            }
            Some(_) => {}
        }
    }

    /// Runs `hook` with the outcome on any terminal transition. Registered
    /// after termination, it runs immediately.
    pub fn on_completion<F>(
        &self,
        hook: F,
    ) where
        F: FnOnce(&SlotOutcome) + Send + 'static,
    {
        let mut hooks = self.hooks.lock();
        match hooks.fired.clone() {
            None => hooks.on_completion.push(Box::new(hook)),
            Some(outcome) => {
                drop(hooks);
                hook(&outcome);
            }
        }
    }

    /// Completes the slot with `payload`. Subjects are reported back in the
    /// form the client supplied. Returns false if the slot already terminated.
    pub fn complete(
        &self,
        payload: Vec<ChangeNotification>,
    ) -> bool {
        let payload = payload
            .into_iter()
            .map(|n| {
                let normalized = normalize_subject(&n.subject, self.ignore_case);
                match self.subjects.get(&normalized) {
                    Some(original) => ChangeNotification::new(original.clone(), n.notification_id),
                    None => n,
                }
            })
            .collect();
        self.transition(SlotState::Completed, SlotOutcome::Changed(payload))
    }

    /// Timer path
    pub fn expire(&self) -> bool {
        self.transition(SlotState::TimedOut, SlotOutcome::TimedOut)
    }

    /// Transport path: the client went away
    pub fn abort(&self) -> bool {
        self.transition(SlotState::Aborted, SlotOutcome::Aborted)
    }

    pub(crate) fn set_timer(
        &self,
        timer: JoinHandle<()>,
    ) {
        *self.timer.lock() = Some(timer);
        // Terminated before the timer was stored
        if !self.is_pending() && self.state() != SlotState::TimedOut {
            if let Some(timer) = self.timer.lock().take() {
                timer.abort();
            }
        }
    }

    fn transition(
        &self,
        to: SlotState,
        outcome: SlotOutcome,
    ) -> bool {
        if self
            .state
            .compare_exchange(
                SlotState::Pending as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            trace!(id = self.id, to = ?to, "slot already terminated");
            return false;
        }

        if to != SlotState::TimedOut {
            if let Some(timer) = self.timer.lock().take() {
                timer.abort();
            }
        }

        let (on_timeout, on_completion) = {
            let mut hooks = self.hooks.lock();
            hooks.fired = Some(outcome.clone());
            (
                std::mem::take(&mut hooks.on_timeout),
                std::mem::take(&mut hooks.on_completion),
            )
        };

        if to == SlotState::TimedOut {
            for hook in on_timeout {
                hook();
            }
        }
        for hook in on_completion {
            hook(&outcome);
        }

        if let Some(tx) = self.sender.lock().take() {
            // Receiver gone means the client stopped waiting
            let _ = tx.send(outcome);
        }

        debug!(id = self.id, state = ?to, "slot terminated");
        true
    }
}

impl PartialEq for LongPollSlot {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.id == other.id
    }
}

impl Eq for LongPollSlot {}

impl PartialOrd for LongPollSlot {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for LongPollSlot {
    fn cmp(
        &self,
        other: &Self,
    ) -> CmpOrdering {
        self.id.cmp(&other.id)
    }
}

/// The caller's side of a slot.
///
/// Dropping a handle whose slot is still pending aborts the slot.
#[derive(Debug)]
pub struct SlotHandle {
    slot: Arc<LongPollSlot>,
    receiver: Option<oneshot::Receiver<SlotOutcome>>,
}

impl SlotHandle {
    pub(crate) fn new(
        slot: Arc<LongPollSlot>,
        receiver: oneshot::Receiver<SlotOutcome>,
    ) -> Self {
        Self {
            slot,
            receiver: Some(receiver),
        }
    }

    pub fn slot(&self) -> &Arc<LongPollSlot> {
        &self.slot
    }

    pub fn id(&self) -> u64 {
        self.slot.id()
    }

    pub fn on_timeout<F>(
        &self,
        hook: F,
    ) where
        F: FnOnce() + Send + 'static,
    {
        self.slot.on_timeout(hook);
    }

    pub fn on_completion<F>(
        &self,
        hook: F,
    ) where
        F: FnOnce(&SlotOutcome) + Send + 'static,
    {
        self.slot.on_completion(hook);
    }

    pub fn complete(
        &self,
        payload: Vec<ChangeNotification>,
    ) -> bool {
        self.slot.complete(payload)
    }

    /// Resolves once the slot terminates. Dropping the future before that
    /// aborts the slot.
    pub async fn wait(mut self) -> SlotOutcome {
        let outcome = match self.receiver.take() {
            Some(rx) => rx.await.ok(),
            None => None,
        };
        outcome.or_else(|| self.slot.outcome()).unwrap_or(SlotOutcome::Aborted)
    }
}

impl Drop for SlotHandle {
    fn drop(&mut self) {
        if self.slot.abort() {
            debug!(id = self.slot.id(), "slot handle dropped while pending");
        }
    }
}

/// Matching form of a subject: trimmed, without the `.properties` suffix,
/// lowercased when `ignore_case` is set
pub fn normalize_subject(
    subject: &str,
    ignore_case: bool,
) -> String {
    let trimmed = subject.trim();
    let folded = if ignore_case {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    };
    match folded.strip_suffix(PROPERTIES_SUFFIX) {
        Some(stripped) => stripped.to_string(),
        None => folded,
    }
}
