//! Work queue for the dispatcher
//!
//! A single FIFO shared by every worker. Producers push under the queue lock
//! and broadcast; idle workers block on the condition variable until an entry
//! shows up.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::runtime::memory::SlotIndex;

/// An entry in the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEntry {
    /// A queued task, by pool slot.
    Task(SlotIndex),
    /// No-op marker that makes a worker re-check the run state.
    Pill,
}

/// Thread-safe FIFO with blocking pop.
#[derive(Debug)]
pub struct TaskQueue {
    /// Pending entries
    entries: Mutex<VecDeque<QueueEntry>>,
    /// Signalled on every push
    available: Condvar,
}

impl TaskQueue {
    /// Create an empty queue with room for `capacity` entries.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
        }
    }

    /// Push an entry to the back and wake all waiting workers.
    ///
    /// Returns the queue length after the push.
    pub fn push(
        &self,
        entry: QueueEntry,
    ) -> usize {
        let len = {
            let mut entries = self.entries.lock();
            entries.push_back(entry);
            entries.len()
        };
        self.available.notify_all();
        len
    }

    /// Push `count` pills behind everything already queued.
    pub fn push_pills(
        &self,
        count: usize,
    ) {
        {
            let mut entries = self.entries.lock();
            entries.extend(std::iter::repeat(QueueEntry::Pill).take(count));
        }
        self.available.notify_all();
    }

    /// Pop the front entry, blocking while the queue is empty.
    pub fn pop_blocking(&self) -> QueueEntry {
        let mut entries = self.entries.lock();
        loop {
            if let Some(entry) = entries.pop_front() {
                return entry;
            }
            self.available.wait(&mut entries);
        }
    }

    /// Pop the front entry if there is one.
    #[inline]
    pub fn try_pop(&self) -> Option<QueueEntry> {
        self.entries.lock().pop_front()
    }

    /// Drop every pill still in the queue, keeping tasks in order.
    ///
    /// Returns how many pills were removed.
    pub fn purge_pills(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| *entry != QueueEntry::Pill);
        before - entries.len()
    }

    /// Number of queued entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of queued tasks, excluding pills.
    pub fn task_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| matches!(entry, QueueEntry::Task(_)))
            .count()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
