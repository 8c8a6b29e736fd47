//! Shared FIFO of rules waiting to be processed.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::rule::Rule;

/// Unbounded multi-producer multi-consumer queue.
///
/// `dequeue` never blocks; workers decide themselves when an empty queue
/// means the search is over.
#[derive(Debug, Default)]
pub struct WorkQueue {
    rules: Mutex<VecDeque<Rule>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, rule: Rule) {
        self.rules.lock().push_back(rule);
    }

    /// Append a batch under a single lock.
    pub fn enqueue_all(&self, rules: impl IntoIterator<Item = Rule>) {
        self.rules.lock().extend(rules);
    }

    pub fn dequeue(&self) -> Option<Rule> {
        self.rules.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.rules.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.lock().is_empty()
    }
}
