use parking_lot::Mutex;

use crate::ChangeListener;
use crate::ChangeRecord;
use crate::Error;
use crate::Result;

/// Keeps every record it receives, with the topic
#[derive(Default)]
pub struct RecordingListener {
    received: Mutex<Vec<(ChangeRecord, String)>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.received.lock().iter().map(|(r, _)| r.id).collect()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.received.lock().iter().map(|(r, _)| r.subject.clone()).collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.received.lock().iter().map(|(_, t)| t.clone()).collect()
    }
}

impl ChangeListener for RecordingListener {
    fn handle(
        &self,
        record: &ChangeRecord,
        topic: &str,
    ) -> Result<()> {
        self.received.lock().push((record.clone(), topic.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Fails every record
pub struct FailingListener;

impl ChangeListener for FailingListener {
    fn handle(
        &self,
        record: &ChangeRecord,
        _topic: &str,
    ) -> Result<()> {
        Err(Error::Listener(format!("rejected {}", record.id)))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Panics on every record
pub struct PanickingListener;

impl ChangeListener for PanickingListener {
    fn handle(
        &self,
        _record: &ChangeRecord,
        _topic: &str,
    ) -> Result<()> {
        panic!("listener bug")
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}
