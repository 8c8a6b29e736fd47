//! Accepted rules, deduplicated by structure, in insertion order.
//!
//! The collector doubles as the hand-off point for streaming output: a
//! consumer thread waits on a condition variable and is woken for every
//! batch of new rules, then once more when the search closes the collector.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::rule::Rule;
use crate::rule::canonical::CanonicalRule;

#[derive(Debug, Default)]
struct State {
    rules: Vec<Arc<Rule>>,
    keys: Vec<CanonicalRule>,
    /// Structural hash to positions in `rules`; a bucket holds more than one
    /// entry only on hash collisions.
    by_hash: HashMap<u64, Vec<usize>>,
    /// Rules already handed to the consumer.
    consumed: usize,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct ResultCollector {
    state: Mutex<State>,
    changed: Condvar,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `rule` unless a structurally identical rule is present. Returns
    /// whether it was added.
    pub fn insert(&self, rule: Arc<Rule>) -> bool {
        let key = rule.canonical_key();
        let hash = key.structural_hash();

        let mut state = self.state.lock();
        let duplicate = state
            .by_hash
            .get(&hash)
            .is_some_and(|bucket| bucket.iter().any(|&i| state.keys[i] == key));
        if duplicate {
            return false;
        }
        let position = state.rules.len();
        state.rules.push(rule);
        state.keys.push(key);
        state.by_hash.entry(hash).or_default().push(position);
        drop(state);
        self.changed.notify_all();
        true
    }

    pub fn len(&self) -> usize {
        self.state.lock().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rules accepted so far, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<Rule>> {
        self.state.lock().rules.clone()
    }

    /// No more rules will be inserted. Wakes the consumer so it can drain
    /// and return.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.changed.notify_all();
    }

    /// Call `callback` on every rule in insertion order, blocking for new
    /// rules until the collector is closed and drained.
    ///
    /// The lock is released while the callback runs, so workers are never
    /// held up by slow output.
    pub fn consume<F: FnMut(&Rule)>(&self, mut callback: F) {
        loop {
            let batch = {
                let mut state = self.state.lock();
                while state.consumed == state.rules.len() && !state.closed {
                    self.changed.wait(&mut state);
                }
                if state.consumed == state.rules.len() {
                    return;
                }
                let batch = state.rules[state.consumed..].to_vec();
                state.consumed = state.rules.len();
                batch
            };
            for rule in &batch {
                callback(rule);
            }
        }
    }
}
