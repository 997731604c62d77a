use std::collections::BTreeMap;

/// Ids expected to exist in the change log but not observed yet.
///
/// Each id carries the number of lookups that failed to find it. Once that
/// count reaches `max_age` the id is dropped for good. The set is bounded by
/// `capacity`.
#[derive(Debug)]
pub struct MissingRecordTracker {
    entries: BTreeMap<u64, u32>,
    max_age: u32,
    capacity: usize,
}

impl MissingRecordTracker {
    pub fn new(
        max_age: u32,
        capacity: usize,
    ) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_age,
            capacity,
        }
    }

    /// Starts tracking `id` at age zero.
    /// Returns false when the id is already tracked or the tracker is full.
    pub fn track(
        &mut self,
        id: u64,
    ) -> bool {
        if self.entries.contains_key(&id) || self.is_full() {
            return false;
        }
        self.entries.insert(id, 0);
        true
    }

    /// Stops tracking `id` because its record showed up
    pub fn resolve(
        &mut self,
        id: u64,
    ) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Counts one failed lookup for each of `looked_up` still tracked.
    /// Returns the ids that reached the age ceiling and were dropped.
    pub fn age(
        &mut self,
        looked_up: &[u64],
    ) -> Vec<u64> {
        let mut abandoned = Vec::new();
        for id in looked_up {
            if let Some(age) = self.entries.get_mut(id) {
                *age += 1;
                if *age >= self.max_age {
                    self.entries.remove(id);
                    abandoned.push(*id);
                }
            }
        }
        abandoned
    }

    /// Tracked ids, ascending
    pub fn ids(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }

    pub fn age_of(
        &self,
        id: u64,
    ) -> Option<u32> {
        self.entries.get(&id).copied()
    }

    pub fn contains(
        &self,
        id: u64,
    ) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }
}
