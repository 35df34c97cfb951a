//! Bounded, ordered step history for one session.

use std::collections::VecDeque;

use crate::domain::models::Step;

/// Ring buffer of the most recent steps of a session.
///
/// Appends are O(1); once `capacity` is reached the oldest step is evicted.
#[derive(Debug, Clone)]
pub struct SessionLedger {
    capacity: usize,
    steps: VecDeque<Step>,
    next_index: u64,
}

impl SessionLedger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            steps: VecDeque::with_capacity(capacity),
            next_index: 0,
        }
    }

    /// Index the next appended step will receive.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Append a step, evicting the oldest one at capacity.
    ///
    /// The step's index is overwritten with the ledger's monotonic counter.
    /// Returns the evicted step, if any.
    pub fn append(&mut self, mut step: Step) -> (u64, Option<Step>) {
        let index = self.next_index;
        step.index = index;
        self.next_index += 1;

        let evicted = if self.steps.len() == self.capacity {
            self.steps.pop_front()
        } else {
            None
        };
        self.steps.push_back(step);
        (index, evicted)
    }

    /// The last `n` steps, oldest first. `n` is capped at the current length.
    pub fn window(&self, n: usize) -> Vec<&Step> {
        let n = n.min(self.steps.len());
        self.steps.iter().skip(self.steps.len() - n).collect()
    }

    pub fn latest(&self) -> Option<&Step> {
        self.steps.back()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
