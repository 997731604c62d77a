use crate::ChangeRecord;
use crate::SecretEntry;

/// Builds change records with consecutive ids
pub struct RecordBuilder {
    id: u64,
    last_modified: u64,
}

impl RecordBuilder {
    pub fn new(start_id: u64) -> Self {
        Self {
            id: start_id,
            last_modified: 1_700_000_000_000,
        }
    }

    pub fn record(
        mut self,
        subject: &str,
    ) -> (Self, ChangeRecord) {
        let record = ChangeRecord::new(self.id, subject, self.last_modified);
        self.id += 1;
        self.last_modified += 1;
        (self, record)
    }

    pub fn skip(
        mut self,
        count: u64,
    ) -> Self {
        self.id += count;
        self
    }
}

pub fn secret(
    id: u64,
    owner: &str,
    last_modified: u64,
) -> SecretEntry {
    SecretEntry::new(id, owner, format!("secret-{id}-{last_modified}"), last_modified)
}
