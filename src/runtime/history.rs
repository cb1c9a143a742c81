//! Bounded history of completed runtime records.

use super::record::{Pid, RuntimeRecord};

/// Fixed-capacity ring buffer of completed records.
///
/// Slots fill up to `capacity`, after which `head` points at the oldest entry
/// and each push overwrites it. Iteration is always oldest first.
#[derive(Debug, Clone)]
pub struct History {
    slots: Vec<RuntimeRecord>,
    head: usize,
    capacity: usize,
}

impl History {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append a record, returning whichever record fell out of the buffer.
    ///
    /// With zero capacity the pushed record itself is returned.
    pub fn push(&mut self, record: RuntimeRecord) -> Option<RuntimeRecord> {
        if self.capacity == 0 {
            return Some(record);
        }
        if self.slots.len() < self.capacity {
            self.slots.push(record);
            return None;
        }
        let evicted = std::mem::replace(&mut self.slots[self.head], record);
        self.head = (self.head + 1) % self.capacity;
        Some(evicted)
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &RuntimeRecord> {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Most recent completion for `pid`.
    pub fn latest_for(&self, pid: Pid) -> Option<&RuntimeRecord> {
        self.iter().rev().find(|r| r.pid() == pid)
    }
}
