// SPDX-License-Identifier: Apache-2.0

//! Ready queues.
//!
//! One queue type serves all three levels; the ordering discipline is a
//! variant chosen at construction rather than a caller-supplied
//! comparator, so the queue never stores callbacks.

use crate::tcb::{ThreadId, ThreadTable};
use std::collections::VecDeque;

/// Ordering discipline of a ready queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    /// Remaining-burst ascending, id ascending on ties.
    Srtf,
    /// Priority descending, id ascending on ties.
    PriorityDesc,
    /// Insertion order.
    Fifo,
}

/// An ordered collection of READY thread ids.
#[derive(Debug)]
pub struct ReadyQueue {
    discipline: Discipline,
    items: VecDeque<ThreadId>,
}

impl ReadyQueue {
    /// Creates an empty queue with the given discipline.
    pub fn new(discipline: Discipline) -> Self {
        ReadyQueue {
            discipline,
            items: VecDeque::new(),
        }
    }

    /// The discipline this queue orders by.
    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Inserts a thread at its ordered position (or at the back for FIFO).
    ///
    /// The sort keys live in the thread table, so sorted disciplines need
    /// it to position the new entry.
    pub fn insert(&mut self, tid: ThreadId, threads: &ThreadTable) {
        match self.discipline {
            Discipline::Fifo => self.items.push_back(tid),
            Discipline::Srtf | Discipline::PriorityDesc => {
                let pos = self
                    .items
                    .iter()
                    .position(|&other| self.comes_before(tid, other, threads))
                    .unwrap_or(self.items.len());
                self.items.insert(pos, tid);
            }
        }
    }

    fn comes_before(&self, a: ThreadId, b: ThreadId, threads: &ThreadTable) -> bool {
        let ta = threads.thread(a);
        let tb = threads.thread(b);
        match self.discipline {
            Discipline::Srtf => ta
                .rem_burst
                .total_cmp(&tb.rem_burst)
                .then(ta.id().cmp(&tb.id()))
                .is_lt(),
            Discipline::PriorityDesc => tb
                .priority
                .cmp(&ta.priority)
                .then(ta.id().cmp(&tb.id()))
                .is_lt(),
            Discipline::Fifo => false,
        }
    }

    /// The thread at the head, without removing it.
    pub fn front(&self) -> Option<ThreadId> {
        self.items.front().copied()
    }

    /// Removes and returns the head thread.
    pub fn pop_front(&mut self) -> Option<ThreadId> {
        self.items.pop_front()
    }

    /// Removes every thread, preserving order.
    pub fn drain(&mut self) -> impl Iterator<Item = ThreadId> + '_ {
        self.items.drain(..)
    }

    /// Iterates the resident threads in queue order.
    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.items.iter().copied()
    }

    /// True when no thread is resident.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of resident threads.
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(specs: &[(u32, f64)]) -> (ThreadTable, Vec<ThreadId>) {
        let mut table = ThreadTable::new();
        let ids = specs
            .iter()
            .enumerate()
            .map(|(i, &(priority, rem))| {
                let id = table.spawn(format!("t{i}"), priority, 0.5).unwrap();
                table.thread_mut(id).rem_burst = rem;
                id
            })
            .collect();
        (table, ids)
    }

    #[test]
    fn test_srtf_orders_by_remaining_then_id() {
        let (table, ids) = table_with(&[(100, 30.0), (100, 20.0), (100, 20.0)]);
        let mut q = ReadyQueue::new(Discipline::Srtf);
        for &id in &ids {
            q.insert(id, &table);
        }
        let order: Vec<_> = q.iter().collect();
        // rem 20 (id 1), rem 20 (id 2), rem 30 (id 0)
        assert_eq!(order, vec![ids[1], ids[2], ids[0]]);
    }

    #[test]
    fn test_priority_desc_orders_by_priority_then_id() {
        let (table, ids) = table_with(&[(60, 0.0), (90, 0.0), (60, 0.0)]);
        let mut q = ReadyQueue::new(Discipline::PriorityDesc);
        // Insert out of order on purpose.
        q.insert(ids[2], &table);
        q.insert(ids[0], &table);
        q.insert(ids[1], &table);
        let order: Vec<_> = q.iter().collect();
        assert_eq!(order, vec![ids[1], ids[0], ids[2]]);
    }

    #[test]
    fn test_fifo_keeps_insertion_order() {
        let (table, ids) = table_with(&[(10, 0.0), (20, 0.0), (5, 0.0)]);
        let mut q = ReadyQueue::new(Discipline::Fifo);
        for &id in &ids {
            q.insert(id, &table);
        }
        assert_eq!(q.pop_front(), Some(ids[0]));
        assert_eq!(q.pop_front(), Some(ids[1]));
        assert_eq!(q.pop_front(), Some(ids[2]));
        assert!(q.is_empty());
    }
}
