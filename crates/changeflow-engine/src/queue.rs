//! Pending set + due-time queue — the authoritative view of scheduled work.
//!
//! The map owns the task records; the heap only orders change numbers by due
//! time. Removal and reschedule never touch the heap — a popped entry counts
//! only if a live task with the same due time still exists (lazy deletion).

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};

use crate::task::ChangeTask;

/// Heap entry: due time first, then insertion sequence for a stable
/// tie-break between changes due at the same instant.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DueEntry {
    due: DateTime<Utc>,
    seq: u64,
    change_number: String,
}

impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The set of pending changes plus their due-time ordering.
///
/// All mutation goes through the engine's single lock; within one call the
/// map and heap are always consistent up to stale heap entries.
pub struct PendingSet {
    tasks: HashMap<String, ChangeTask>,
    queue: BinaryHeap<Reverse<DueEntry>>,
    seq: u64,
}

impl PendingSet {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            queue: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Add or overwrite the entry for `task.change_number`.
    ///
    /// A fresh heap entry is always pushed; an entry left behind by an
    /// earlier schedule of the same change goes stale and is discarded at
    /// pop time. Returns the replaced task on reschedule.
    pub fn insert(&mut self, task: ChangeTask) -> Option<ChangeTask> {
        self.queue.push(Reverse(DueEntry {
            due: task.implementation_time,
            seq: self.seq,
            change_number: task.change_number.clone(),
        }));
        self.seq += 1;
        self.tasks.insert(task.change_number.clone(), task)
    }

    /// Remove a change from the set. The heap is left alone.
    pub fn remove(&mut self, change_number: &str) -> Option<ChangeTask> {
        self.tasks.remove(change_number)
    }

    pub fn get(&self, change_number: &str) -> Option<&ChangeTask> {
        self.tasks.get(change_number)
    }

    pub fn contains(&self, change_number: &str) -> bool {
        self.tasks.contains_key(change_number)
    }

    /// Snapshot copy of every pending task. Order is not meaningful.
    pub fn all(&self) -> Vec<ChangeTask> {
        self.tasks.values().cloned().collect()
    }

    /// The change numbers currently pending.
    pub fn change_numbers(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Due time and change number at the head of the queue, stale entries
    /// included — the dispatch loop reconciles after popping.
    pub fn peek_next(&self) -> Option<(DateTime<Utc>, &str)> {
        self.queue
            .peek()
            .map(|Reverse(e)| (e.due, e.change_number.as_str()))
    }

    /// Pop the queue head unconditionally (the caller has already peeked).
    pub fn pop_next(&mut self) -> Option<(DateTime<Utc>, String)> {
        self.queue.pop().map(|Reverse(e)| (e.due, e.change_number))
    }

    /// Earliest live change, from the authoritative map rather than the
    /// heap, so stale entries cannot leak into health reporting.
    pub fn next_due(&self) -> Option<&ChangeTask> {
        self.tasks
            .values()
            .min_by(|a, b| {
                a.implementation_time
                    .cmp(&b.implementation_time)
                    .then_with(|| a.change_number.cmp(&b.change_number))
            })
    }
}

impl Default for PendingSet {
    fn default() -> Self {
        Self::new()
    }
}
