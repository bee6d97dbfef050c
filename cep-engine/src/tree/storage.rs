//! Partial matches and their per-node storage

use crate::types::{SharedEvent, Timestamp};
use std::collections::BTreeMap;

/// A set of events satisfying part of the pattern
///
/// Bindings are kept sorted by leaf index.
#[derive(Debug, Clone)]
pub(crate) struct PartialMatch {
    bindings: Vec<(usize, SharedEvent)>,
    first: Timestamp,
    last: Timestamp,
}

impl PartialMatch {
    pub fn single(leaf: usize, event: SharedEvent) -> Self {
        let timestamp = event.timestamp;
        Self {
            bindings: vec![(leaf, event)],
            first: timestamp,
            last: timestamp,
        }
    }

    pub fn first(&self) -> Timestamp {
        self.first
    }

    pub fn last(&self) -> Timestamp {
        self.last
    }

    pub fn bindings(&self) -> &[(usize, SharedEvent)] {
        &self.bindings
    }

    /// Event bound to `leaf`, if any
    pub fn event(&self, leaf: usize) -> Option<&SharedEvent> {
        self.bindings
            .binary_search_by_key(&leaf, |(l, _)| *l)
            .ok()
            .map(|position| &self.bindings[position].1)
    }

    /// The only event of a single-leaf partial match
    pub fn single_event(&self) -> Option<&SharedEvent> {
        match self.bindings.as_slice() {
            [(_, event)] => Some(event),
            _ => None,
        }
    }

    /// True if both partial matches bind the same input event
    pub fn shares_event_with(&self, other: &PartialMatch) -> bool {
        self.bindings
            .iter()
            .any(|(_, a)| other.bindings.iter().any(|(_, b)| a.id == b.id))
    }

    /// Union of two partial matches over disjoint leaves
    pub fn merge(&self, other: &PartialMatch) -> PartialMatch {
        let mut bindings = Vec::with_capacity(self.bindings.len() + other.bindings.len());
        let (mut i, mut j) = (0, 0);
        while i < self.bindings.len() && j < other.bindings.len() {
            if self.bindings[i].0 <= other.bindings[j].0 {
                bindings.push(self.bindings[i].clone());
                i += 1;
            } else {
                bindings.push(other.bindings[j].clone());
                j += 1;
            }
        }
        bindings.extend_from_slice(&self.bindings[i..]);
        bindings.extend_from_slice(&other.bindings[j..]);

        PartialMatch {
            bindings,
            first: self.first.min(other.first),
            last: self.last.max(other.last),
        }
    }
}

/// Partial matches of one node, ordered by their oldest event
///
/// Keys are `(first timestamp, insertion sequence)`, so expiry is a single
/// split at the horizon.
#[derive(Debug)]
pub(crate) struct PartialMatchStore {
    entries: BTreeMap<(Timestamp, u64), PartialMatch>,
    next_sequence: u64,
    capacity: Option<usize>,
    evicted: u64,
}

impl PartialMatchStore {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: BTreeMap::new(),
            next_sequence: 0,
            capacity,
            evicted: 0,
        }
    }

    pub fn insert(&mut self, partial_match: PartialMatch) {
        let key = (partial_match.first(), self.next_sequence);
        self.next_sequence += 1;
        self.entries.insert(key, partial_match);

        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity {
                self.entries.pop_first();
                self.evicted += 1;
            }
        }
    }

    /// Drop every partial match whose oldest event is before `horizon`
    pub fn purge_older_than(&mut self, horizon: Timestamp) -> usize {
        let kept = self.entries.split_off(&(horizon, 0));
        let purged = std::mem::replace(&mut self.entries, kept);
        purged.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartialMatch> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Partial matches dropped because the store was full
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
